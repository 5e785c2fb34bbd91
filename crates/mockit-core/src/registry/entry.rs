use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tracing::trace;

use crate::{
    error::PatchError,
    object::ObjectRef,
    patch::{MemberPatcher, PatchHandle},
    protocol,
    value::Function,
};

/// One mocked method of a service: the replacement, the wrapper installed
/// in its place, and a handle for every member the wrapper sits on
pub(crate) struct MethodMockEntry {
    replacement: Function,
    wrapper: Function,
    calls: Arc<AtomicUsize>,
    active_patches: Vec<PatchHandle>,
}

impl MethodMockEntry {
    pub(crate) fn new(method: &str, replacement: Function, count_calls: bool) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapper = {
            let calls = calls.clone();
            let replacement = replacement.clone();
            let method = method.to_string();
            Function::new(method.clone(), move |this, args| {
                if count_calls {
                    calls.fetch_add(1, Ordering::Relaxed);
                }
                trace!(method = %method, receiver = ?this, "intercepted call");
                protocol::forward(&replacement, args)
            })
        };

        Self {
            replacement,
            wrapper,
            calls,
            active_patches: Vec::new(),
        }
    }

    pub(crate) fn replacement(&self) -> &Function {
        &self.replacement
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub(crate) fn patch_count(&self) -> usize {
        self.active_patches.len()
    }

    /// Install the wrapper on `target`'s member
    pub(crate) fn apply(
        &mut self,
        patcher: &dyn MemberPatcher,
        target: &ObjectRef,
        method: &str,
    ) -> Result<(), PatchError> {
        let handle = self.install(patcher, target, method)?;
        self.track(handle);
        Ok(())
    }

    /// Install the wrapper without taking ownership of the patch
    pub(crate) fn install(
        &self,
        patcher: &dyn MemberPatcher,
        target: &ObjectRef,
        method: &str,
    ) -> Result<PatchHandle, PatchError> {
        patcher.install(target, method, self.wrapper.clone())
    }

    pub(crate) fn track(&mut self, handle: PatchHandle) {
        self.active_patches.push(handle);
    }

    /// Undo every active patch, newest first. On failure the patches not
    /// yet undone stay with the entry.
    pub(crate) fn restore(&mut self) -> Result<(), PatchError> {
        while let Some(handle) = self.active_patches.pop() {
            handle.undo()?;
        }
        Ok(())
    }
}
