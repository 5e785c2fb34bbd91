//! Target resolution
//!
//! Identifiers are dotted paths: the first segment names a module in the
//! [`ModuleTable`], the rest walk members of objects reached along the way.
//! Resolution reports the object that holds the final member, so callers
//! can patch the member itself rather than only the value behind it.

use tracing::trace;

use crate::{
    error::ResolveError,
    object::ObjectRef,
    value::Value,
};

/// What a resolved target looks like at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A shared object, patched directly
    Object,
    /// A function or class whose instances are patched as they are created
    Callable,
    /// Anything else (data members); never mockable
    Other,
}

impl TargetKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => TargetKind::Object,
            Value::Function(_) => TargetKind::Callable,
            _ => TargetKind::Other,
        }
    }
}

/// Outcome of resolving an identifier
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Object holding the final member (the module table for bare modules)
    pub parent: ObjectRef,
    /// Name of the final member on `parent`
    pub member: String,
    /// `Null` when `parent` has no such member
    pub value: Value,
    pub kind: TargetKind,
}

/// Resolves identifiers to targets
pub trait TargetResolver: Send + Sync {
    fn resolve(&self, identifier: &str) -> Result<Resolution, ResolveError>;
}

/// Loaded modules, stored as members of a single root object
///
/// Cloning shares the table. Code under test looks modules up with
/// [`ModuleTable::require`] on every use, so a patched module entry
/// is observed the same way a patched member is.
#[derive(Debug, Clone)]
pub struct ModuleTable {
    root: ObjectRef,
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleTable {
    pub fn new() -> Self {
        Self {
            root: ObjectRef::new("modules"),
        }
    }

    /// Load (or replace) a module under `name`
    pub fn register(&self, name: &str, module: impl Into<Value>) {
        self.root.set(name, module);
    }

    pub fn require(&self, name: &str) -> Result<Value, ResolveError> {
        self.root
            .get_own(name)
            .ok_or_else(|| ResolveError::ModuleNotFound {
                module: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.root.member_names()
    }

    pub fn root(&self) -> &ObjectRef {
        &self.root
    }
}

impl TargetResolver for ModuleTable {
    fn resolve(&self, identifier: &str) -> Result<Resolution, ResolveError> {
        let segments: Vec<&str> = identifier.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(ResolveError::EmptyIdentifier {
                identifier: identifier.to_string(),
            });
        }

        let (module, path) = segments
            .split_first()
            .ok_or_else(|| ResolveError::EmptyIdentifier {
                identifier: identifier.to_string(),
            })?;

        let mut parent = self.root.clone();
        let mut member = module.to_string();
        let mut value = self.require(module)?;

        for (index, segment) in path.iter().enumerate() {
            let next_parent = match &value {
                Value::Object(obj) => obj.clone(),
                other => {
                    return Err(ResolveError::NotTraversable {
                        identifier: identifier.to_string(),
                        segment: segment.to_string(),
                        found: other.type_name().to_string(),
                    })
                }
            };
            let is_last = index + 1 == path.len();
            value = match next_parent.get(segment) {
                Some(found) => found,
                // A missing final member resolves to nothing, which is not mockable
                None if is_last => Value::Null,
                None => {
                    return Err(ResolveError::PathNotFound {
                        identifier: identifier.to_string(),
                        segment: segment.to_string(),
                    })
                }
            };
            parent = next_parent;
            member = segment.to_string();
        }

        let kind = TargetKind::of(&value);
        trace!(identifier, ?kind, holder = %parent.name(), "resolved target");
        Ok(Resolution {
            parent,
            member,
            value,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::object::ClassBuilder;

    fn table() -> ModuleTable {
        let modules = ModuleTable::new();
        let fs = ObjectRef::new("fs");
        let promises = ObjectRef::new("fs.promises");
        promises.define_method("readFile", |_this, _args| Ok(Value::from("data")));
        fs.set("promises", promises);
        fs.set("sep", "/");
        modules.register("fs", fs);
        modules.register("net", {
            let net = ObjectRef::new("net");
            net.set("Socket", ClassBuilder::new("Socket").build());
            net
        });
        modules
    }

    #[test]
    fn test_resolve_root_module() -> anyhow::Result<()> {
        let modules = table();
        let resolution = modules.resolve("fs")?;
        assert_eq!(resolution.kind, TargetKind::Object);
        assert_eq!(resolution.member, "fs");
        assert!(resolution.parent.ptr_eq(modules.root()));
        Ok(())
    }

    #[test]
    fn test_resolve_nested_paths() -> anyhow::Result<()> {
        let modules = table();

        let promises = modules.resolve("fs.promises")?;
        assert_eq!(promises.kind, TargetKind::Object);
        assert_eq!(promises.parent.name(), "fs");

        let socket = modules.resolve("net.Socket")?;
        assert_eq!(socket.kind, TargetKind::Callable);
        assert_eq!(socket.member, "Socket");

        let sep = modules.resolve("fs.sep")?;
        assert_eq!(sep.kind, TargetKind::Other);
        Ok(())
    }

    #[test]
    fn test_resolve_missing_final_member() -> anyhow::Result<()> {
        let modules = table();
        let missing = modules.resolve("fs.missing")?;
        assert_eq!(missing.kind, TargetKind::Other);
        assert_eq!(missing.value, Value::Null);
        assert_eq!(missing.member, "missing");
        assert!(!missing.parent.has("missing"));
        Ok(())
    }

    #[test]
    fn test_resolve_errors() {
        let modules = table();
        assert_eq!(
            modules.resolve("http").unwrap_err(),
            ResolveError::ModuleNotFound {
                module: "http".to_string()
            }
        );
        assert!(matches!(
            modules.resolve("fs..promises"),
            Err(ResolveError::EmptyIdentifier { .. })
        ));
        assert!(matches!(
            modules.resolve(""),
            Err(ResolveError::EmptyIdentifier { .. })
        ));
        assert!(matches!(
            modules.resolve("fs.missing.readFile"),
            Err(ResolveError::PathNotFound { segment, .. }) if segment == "missing"
        ));
        assert!(matches!(
            modules.resolve("fs.sep.length"),
            Err(ResolveError::NotTraversable { found, .. }) if found == "string"
        ));
    }
}
