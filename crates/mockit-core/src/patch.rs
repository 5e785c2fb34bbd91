//! Member patching primitive
//!
//! A [`MemberPatcher`] installs a function in place of a member and hands
//! back a [`PatchHandle`]. Undoing consumes the handle, so a patch can be
//! reverted at most once.

use std::fmt;

use tracing::trace;

use crate::{
    error::PatchError,
    object::ObjectRef,
    value::{Function, Value},
};

type Revert = Box<dyn FnOnce() -> Result<(), PatchError> + Send>;

/// Capability to revert one installed patch
pub struct PatchHandle {
    target: ObjectRef,
    member: String,
    revert: Revert,
}

impl PatchHandle {
    pub fn new<F>(target: ObjectRef, member: impl Into<String>, revert: F) -> Self
    where
        F: FnOnce() -> Result<(), PatchError> + Send + 'static,
    {
        Self {
            target,
            member: member.into(),
            revert: Box::new(revert),
        }
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn undo(self) -> Result<(), PatchError> {
        trace!(member = %self.member, target = ?self.target, "undoing patch");
        (self.revert)()
    }
}

impl fmt::Debug for PatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchHandle")
            .field("target", &self.target)
            .field("member", &self.member)
            .finish()
    }
}

/// Installs replacement functions on object members
pub trait MemberPatcher: Send + Sync {
    fn install(
        &self,
        target: &ObjectRef,
        member: &str,
        replacement: Function,
    ) -> Result<PatchHandle, PatchError>;
}

/// Default patcher: rewrites the target's own member
///
/// An inherited member is shadowed and comes back once the own member is
/// removed on undo. Undo refuses to touch a member that no longer holds
/// the installed function.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnMemberPatcher;

impl MemberPatcher for OwnMemberPatcher {
    fn install(
        &self,
        target: &ObjectRef,
        member: &str,
        replacement: Function,
    ) -> Result<PatchHandle, PatchError> {
        let previous = target.set(member, replacement.clone());
        trace!(member, target = ?target, shadowed = previous.is_none(), "installed patch");

        let object = target.clone();
        let name = member.to_string();
        Ok(PatchHandle::new(target.clone(), member, move || {
            match object.get_own(&name) {
                Some(Value::Function(current)) if current.ptr_eq(&replacement) => {}
                _ => {
                    return Err(PatchError::Displaced {
                        member: name,
                        object: object.name(),
                    })
                }
            }
            match previous {
                Some(original) => {
                    object.set(&name, original);
                }
                None => {
                    object.remove(&name);
                }
            }
            Ok(())
        }))
    }
}
