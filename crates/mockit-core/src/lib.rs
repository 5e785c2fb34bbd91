//! # Mockit Core
//!
//! Runtime method interception for test doubles:
//! - A dynamic object model (values, objects with prototype chains, classes)
//! - Target resolution over a table of loaded modules
//! - Reversible member patching
//! - A registry that mocks methods on singleton objects and on every
//!   instance of a class, and restores them on demand
//!
//! ```
//! use mockit_core::{Function, ModuleTable, ObjectRef, Registry, Value};
//!
//! let os = ObjectRef::new("os");
//! os.define_method("arch", |_this, _args| Ok(Value::from("x64")));
//! let modules = ModuleTable::new();
//! modules.register("os", os.clone());
//!
//! let mut registry = Registry::new(modules);
//! registry.mock("os", "arch", Function::native("arch", |_| Ok(Value::from("x128"))))?;
//! assert_eq!(os.invoke("arch", &[])?, Value::from("x128"));
//!
//! registry.restore_all()?;
//! assert_eq!(os.invoke("arch", &[])?, Value::from("x64"));
//! # Ok::<(), anyhow::Error>(())
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod object;
pub mod patch;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod value;

// Re-export commonly used types
pub use error::{MockError, ObjectError, PatchError, ResolveError};
pub use object::{ClassBuilder, ObjectId, ObjectRef};
pub use patch::{MemberPatcher, OwnMemberPatcher, PatchHandle};
pub use protocol::{classify, CallShape};
pub use registry::{Registry, SharedRegistry};
pub use resolver::{ModuleTable, Resolution, TargetKind, TargetResolver};
pub use value::{Function, Value, WeakFunction};

use serde::{Deserialize, Serialize};

/// Mockit version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for mockit components
///
/// Honors `RUST_LOG`; defaults to `mockit_core=info`. Does nothing if a
/// global subscriber is already installed.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mockit_core=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// What `restore_all` does when one service fails to restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// Stop at the first failure; later services stay registered
    #[default]
    FailFast,
    /// Attempt every service, then report all failures together
    CollectAndContinue,
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockitConfig {
    /// Failure handling for `restore_all`
    pub restore_policy: RestorePolicy,
    /// Allow mocking members the target does not define. Restoring such a
    /// mock removes the member again.
    pub allow_missing_members: bool,
    /// Count intercepted calls per mocked method
    pub count_calls: bool,
}

impl Default for MockitConfig {
    fn default() -> Self {
        Self {
            restore_policy: RestorePolicy::FailFast,
            allow_missing_members: false,
            count_calls: true,
        }
    }
}

impl MockitConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, MockError>;
