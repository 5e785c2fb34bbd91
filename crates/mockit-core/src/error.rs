use thiserror::Error;

/// Errors raised by the object model while invoking or constructing
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("Member '{member}' not found on {object}")]
    MemberNotFound { member: String, object: String },

    #[error("Member '{member}' on {object} is not callable (found {found})")]
    NotCallable {
        member: String,
        object: String,
        found: String,
    },

    #[error("Method '{method}' requires a receiver")]
    MissingReceiver { method: String },

    #[error("Class '{class}' is no longer available")]
    ClassDropped { class: String },
}

impl ObjectError {
    pub fn member_not_found(member: &str, object: &str) -> Self {
        Self::MemberNotFound {
            member: member.to_string(),
            object: object.to_string(),
        }
    }

    pub fn not_callable(member: &str, object: &str, found: &str) -> Self {
        Self::NotCallable {
            member: member.to_string(),
            object: object.to_string(),
            found: found.to_string(),
        }
    }
}

/// Target resolution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Empty identifier or path segment in '{identifier}'")]
    EmptyIdentifier { identifier: String },

    #[error("Module '{module}' is not loaded")]
    ModuleNotFound { module: String },

    #[error("Path '{identifier}' has no member '{segment}'")]
    PathNotFound { identifier: String, segment: String },

    #[error("Cannot traverse into '{segment}' of '{identifier}': {found} has no members")]
    NotTraversable {
        identifier: String,
        segment: String,
        found: String,
    },
}

/// Errors from the member patching primitive
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    /// The member no longer holds the function this patch installed
    #[error("Member '{member}' on {object} was replaced outside of its patch")]
    Displaced { member: String, object: String },
}

/// Registry-level errors
#[derive(Error, Debug)]
pub enum MockError {
    #[error("The service '{identifier}' is not mockable (resolved to {found})")]
    NotMockable { identifier: String, found: String },

    #[error("Service '{identifier}' is not mocked")]
    UnknownService { identifier: String },

    #[error("Method '{method}' for service '{identifier}' is not mocked")]
    UnknownMethod { identifier: String, method: String },

    #[error("Cannot mock '{method}' on '{identifier}': expected a function, found {found}")]
    MemberMismatch {
        identifier: String,
        method: String,
        found: String,
    },

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Failed to restore {} service(s): {}", .failures.len(), summarize(.failures))]
    RestoreAll { failures: Vec<(String, MockError)> },
}

impl MockError {
    pub fn unknown_service(identifier: &str) -> Self {
        Self::UnknownService {
            identifier: identifier.to_string(),
        }
    }

    pub fn unknown_method(identifier: &str, method: &str) -> Self {
        Self::UnknownMethod {
            identifier: identifier.to_string(),
            method: method.to_string(),
        }
    }

    pub fn member_mismatch(identifier: &str, method: &str, found: &str) -> Self {
        Self::MemberMismatch {
            identifier: identifier.to_string(),
            method: method.to_string(),
            found: found.to_string(),
        }
    }
}

fn summarize(failures: &[(String, MockError)]) -> String {
    failures
        .iter()
        .map(|(identifier, err)| format!("{identifier}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
