use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{check_member, ServiceState};
use crate::{
    error::{MockError, PatchError},
    object::ObjectRef,
    patch::{MemberPatcher, PatchHandle},
    value::{Function, Value, WeakFunction},
};

/// Construction bookkeeping for an instantiable service
pub(crate) struct InstanceState {
    /// The class is owned by its module (or, while displaced, by the
    /// constructor patch); this reference never keeps it alive
    pub(super) original_class: WeakFunction,
    live_instances: Vec<ObjectRef>,
    constructor_patch: Option<PatchHandle>,
}

impl InstanceState {
    pub(crate) fn new(original_class: WeakFunction, constructor_patch: PatchHandle) -> Self {
        Self {
            original_class,
            live_instances: Vec::new(),
            constructor_patch: Some(constructor_patch),
        }
    }

    pub(crate) fn original_class(&self) -> Option<Function> {
        self.original_class.upgrade()
    }

    pub(crate) fn live_instances(&self) -> &[ObjectRef] {
        &self.live_instances
    }

    /// Undo the constructor patch and forget every tracked instance
    pub(crate) fn release(&mut self) -> Result<(), PatchError> {
        if let Some(handle) = self.constructor_patch.take() {
            handle.undo()?;
        }
        self.live_instances.clear();
        Ok(())
    }
}

impl ServiceState {
    /// Bring a freshly constructed instance in line with the current mocks
    /// and start tracking it
    pub(crate) fn adopt_instance(
        &mut self,
        identifier: &str,
        instance: ObjectRef,
        patcher: &dyn MemberPatcher,
        allow_missing_members: bool,
    ) -> Result<(), MockError> {
        if !allow_missing_members {
            for method in self.method_mocks.keys() {
                check_member(&instance, identifier, method)?;
            }
        }
        if self.instances.is_none() {
            return Ok(());
        }

        // All or nothing: an instance is tracked only once every mock is on it
        let mut applied = Vec::with_capacity(self.method_mocks.len());
        for (method, entry) in &self.method_mocks {
            match entry.install(patcher, &instance, method) {
                Ok(handle) => applied.push(handle),
                Err(err) => {
                    for handle in applied.into_iter().rev() {
                        if let Err(undo_err) = handle.undo() {
                            warn!(identifier, error = %undo_err, "failed to roll back instance patch");
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        for (entry, handle) in self.method_mocks.values_mut().zip(applied) {
            entry.track(handle);
        }

        let Some(instances) = self.instances.as_mut() else {
            return Ok(());
        };
        instances.live_instances.push(instance.clone());
        trace!(
            identifier,
            instance = ?instance,
            mocks = self.method_mocks.len(),
            live = instances.live_instances.len(),
            "tracked new instance"
        );
        Ok(())
    }
}

/// Build the function installed in place of a class. It constructs the
/// real instance, applies the service's mocks to it, and records it.
pub(crate) fn constructor_interceptor(
    identifier: &str,
    class: WeakFunction,
    state: Weak<Mutex<ServiceState>>,
    patcher: Arc<dyn MemberPatcher>,
    allow_missing_members: bool,
) -> Function {
    let identifier = identifier.to_string();
    Function::new(class.name().to_string(), move |_this, args| {
        let original = class.require()?;
        let constructed = original.construct(args)?;

        let Some(state) = state.upgrade() else {
            trace!(identifier = %identifier, "service restored, constructing without mocks");
            return Ok(constructed);
        };

        if let Value::Object(instance) = &constructed {
            state.lock().adopt_instance(
                &identifier,
                instance.clone(),
                patcher.as_ref(),
                allow_missing_members,
            )?;
        }
        Ok(constructed)
    })
}
