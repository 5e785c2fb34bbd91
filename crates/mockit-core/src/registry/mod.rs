//! Service registry
//!
//! Tracks every mocked service: the resolved target, the mocked methods in
//! registration order and, for classes, the instances created while the
//! service is mocked. Each operation runs to completion before the next one
//! starts; share a registry across threads through [`SharedRegistry`].

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    error::MockError,
    object::ObjectRef,
    patch::{MemberPatcher, OwnMemberPatcher},
    resolver::{TargetKind, TargetResolver},
    value::{Function, Value},
    MockitConfig, RestorePolicy, Result,
};

mod entry;
mod tracker;

#[cfg(test)]
mod tests;

use entry::MethodMockEntry;
use tracker::InstanceState;

/// A registry behind the single lock that serializes its mutations
pub type SharedRegistry = Arc<Mutex<Registry>>;

enum ServiceTarget {
    /// Mocks are installed on the object itself
    Singleton(ObjectRef),
    /// Mocks are installed on each instance as it is constructed
    Instantiable,
}

/// Mutable part of a service, shared with its constructor interceptor
#[derive(Default)]
pub(crate) struct ServiceState {
    method_mocks: IndexMap<String, MethodMockEntry>,
    instances: Option<InstanceState>,
}

struct ServiceRecord {
    identifier: String,
    target: ServiceTarget,
    state: Arc<Mutex<ServiceState>>,
}

impl ServiceRecord {
    fn mock_method(
        &self,
        method: &str,
        replacement: Function,
        config: &MockitConfig,
        patcher: &dyn MemberPatcher,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !config.allow_missing_members {
            self.verify_member(&state, method)?;
        }

        if let Some(previous) = state.method_mocks.get_mut(method) {
            debug!(
                identifier = %self.identifier,
                method,
                previous = previous.replacement().name(),
                "replacing existing mock"
            );
            previous.restore()?;
            state.method_mocks.shift_remove(method);
        }

        let mut entry = MethodMockEntry::new(method, replacement, config.count_calls);
        let applied = match (&self.target, &state.instances) {
            (ServiceTarget::Singleton(target), _) => entry.apply(patcher, target, method),
            (ServiceTarget::Instantiable, Some(instances)) => instances
                .live_instances()
                .iter()
                .try_for_each(|instance| entry.apply(patcher, instance, method)),
            (ServiceTarget::Instantiable, None) => Ok(()),
        };
        if let Err(err) = applied {
            entry.restore()?;
            return Err(err.into());
        }

        debug!(
            identifier = %self.identifier,
            method,
            patches = entry.patch_count(),
            "mocked method"
        );
        state.method_mocks.insert(method.to_string(), entry);
        Ok(())
    }

    /// Check the member about to be mocked is a function. Singletons are
    /// checked directly. Class members are checked on the prototype when it
    /// defines them; otherwise on every live instance, leaving instances
    /// constructed later to be checked as they are adopted.
    fn verify_member(&self, state: &ServiceState, method: &str) -> Result<()> {
        let instances = match &self.target {
            ServiceTarget::Singleton(target) => {
                return check_member(target, &self.identifier, method)
            }
            ServiceTarget::Instantiable => match state.instances.as_ref() {
                Some(instances) => instances,
                None => return Ok(()),
            },
        };

        let prototype = instances
            .original_class()
            .and_then(|class| class.prototype().cloned());
        if let Some(prototype) = prototype.filter(|prototype| prototype.has(method)) {
            return check_member(&prototype, &self.identifier, method);
        }
        instances
            .live_instances()
            .iter()
            .try_for_each(|instance| check_member(instance, &self.identifier, method))
    }

    fn restore_method(&self, method: &str) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .method_mocks
            .get_mut(method)
            .ok_or_else(|| MockError::unknown_method(&self.identifier, method))?;
        entry.restore()?;
        state.method_mocks.shift_remove(method);
        debug!(identifier = %self.identifier, method, "restored method");
        Ok(())
    }

    /// Restore every method, then release construction interception
    fn restore(&self) -> Result<()> {
        let mut state = self.state.lock();
        while let Some((_, entry)) = state.method_mocks.first_mut() {
            entry.restore()?;
            state.method_mocks.shift_remove_index(0);
        }
        if let Some(instances) = state.instances.as_mut() {
            instances.release()?;
        }
        state.instances = None;
        Ok(())
    }

    fn method_names(&self) -> Vec<String> {
        self.state.lock().method_mocks.keys().cloned().collect()
    }
}

pub(crate) fn check_member(
    holder: &ObjectRef,
    identifier: &str,
    method: &str,
) -> std::result::Result<(), MockError> {
    match holder.get(method) {
        Some(Value::Function(_)) => Ok(()),
        Some(other) => Err(MockError::member_mismatch(
            identifier,
            method,
            other.type_name(),
        )),
        None => Err(MockError::member_mismatch(identifier, method, "undefined")),
    }
}

/// Registry of mocked services
pub struct Registry {
    resolver: Arc<dyn TargetResolver>,
    patcher: Arc<dyn MemberPatcher>,
    config: MockitConfig,
    services: IndexMap<String, ServiceRecord>,
}

impl Registry {
    pub fn new(resolver: impl TargetResolver + 'static) -> Self {
        Self::with_config(resolver, MockitConfig::default())
    }

    pub fn with_config(resolver: impl TargetResolver + 'static, config: MockitConfig) -> Self {
        Self::from_parts(Arc::new(resolver), Arc::new(OwnMemberPatcher), config)
    }

    pub fn from_parts(
        resolver: Arc<dyn TargetResolver>,
        patcher: Arc<dyn MemberPatcher>,
        config: MockitConfig,
    ) -> Self {
        Self {
            resolver,
            patcher,
            config,
            services: IndexMap::new(),
        }
    }

    pub fn resolver(&self) -> &dyn TargetResolver {
        self.resolver.as_ref()
    }

    pub fn config(&self) -> &MockitConfig {
        &self.config
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Replace `method` on the target named by `identifier`
    ///
    /// The identifier is resolved on first use only. Mocking a method that
    /// is already mocked restores the previous mock first.
    pub fn mock(&mut self, identifier: &str, method: &str, replacement: Function) -> Result<()> {
        let created = !self.services.contains_key(identifier);
        if created {
            let record = self.setup_service(identifier)?;
            self.services.insert(identifier.to_string(), record);
        }

        let result = match self.services.get(identifier) {
            Some(record) => {
                record.mock_method(method, replacement, &self.config, self.patcher.as_ref())
            }
            None => Err(MockError::unknown_service(identifier)),
        };

        if result.is_err() && created {
            // A service exists only while it has mocks
            if let Some(record) = self.services.shift_remove(identifier) {
                if let Err(err) = record.restore() {
                    warn!(identifier, error = %err, "failed to discard service after mock error");
                }
            }
        }
        result
    }

    fn setup_service(&self, identifier: &str) -> Result<ServiceRecord> {
        let resolution = self.resolver.resolve(identifier)?;
        let state = Arc::new(Mutex::new(ServiceState::default()));

        let found = if resolution.parent.has(&resolution.member) {
            resolution.value.type_name()
        } else {
            "undefined"
        };
        let target = match (resolution.kind, resolution.value) {
            (TargetKind::Object, Value::Object(target)) => {
                debug!(identifier, "registering singleton service");
                ServiceTarget::Singleton(target)
            }
            (TargetKind::Callable, Value::Function(class)) => {
                let interceptor = tracker::constructor_interceptor(
                    identifier,
                    class.downgrade(),
                    Arc::downgrade(&state),
                    self.patcher.clone(),
                    self.config.allow_missing_members,
                );
                let handle =
                    self.patcher
                        .install(&resolution.parent, &resolution.member, interceptor)?;
                state.lock().instances = Some(InstanceState::new(class.downgrade(), handle));
                debug!(
                    identifier,
                    class = class.name(),
                    holder = %resolution.parent.name(),
                    "intercepting construction"
                );
                ServiceTarget::Instantiable
            }
            _ => {
                return Err(MockError::NotMockable {
                    identifier: identifier.to_string(),
                    found: found.to_string(),
                })
            }
        };

        Ok(ServiceRecord {
            identifier: identifier.to_string(),
            target,
            state,
        })
    }

    /// Identifiers of every mocked service, in registration order
    pub fn service_list(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Methods mocked for a service, in registration order, or `None` when
    /// the service is not registered
    pub fn mocks_for_service(&self, identifier: &str) -> Option<Vec<String>> {
        self.services.get(identifier).map(ServiceRecord::method_names)
    }

    pub fn is_mocked(&self, identifier: &str, method: &str) -> bool {
        self.services
            .get(identifier)
            .is_some_and(|record| record.state.lock().method_mocks.contains_key(method))
    }

    /// Number of intercepted calls to a mocked method since it was mocked
    pub fn call_count(&self, identifier: &str, method: &str) -> Result<usize> {
        let record = self.record(identifier)?;
        let state = record.state.lock();
        state
            .method_mocks
            .get(method)
            .map(MethodMockEntry::call_count)
            .ok_or_else(|| MockError::unknown_method(identifier, method))
    }

    /// Instances constructed since the service was first mocked; empty for
    /// singleton services
    pub fn live_instances(&self, identifier: &str) -> Result<Vec<ObjectRef>> {
        let record = self.record(identifier)?;
        let state = record.state.lock();
        Ok(state
            .instances
            .as_ref()
            .map(|instances| instances.live_instances().to_vec())
            .unwrap_or_default())
    }

    pub fn restore_method(&mut self, identifier: &str, method: &str) -> Result<()> {
        self.record(identifier)?.restore_method(method)
    }

    pub fn restore_service(&mut self, identifier: &str) -> Result<()> {
        self.record(identifier)?.restore()?;
        self.services.shift_remove(identifier);
        debug!(identifier, "restored service");
        Ok(())
    }

    /// Restore every service according to the configured [`RestorePolicy`]
    pub fn restore_all(&mut self) -> Result<()> {
        match self.config.restore_policy {
            RestorePolicy::FailFast => {
                for identifier in self.service_list() {
                    self.restore_service(&identifier)?;
                }
                Ok(())
            }
            RestorePolicy::CollectAndContinue => {
                let mut failures = Vec::new();
                for identifier in self.service_list() {
                    if let Err(err) = self.restore_service(&identifier) {
                        warn!(identifier = %identifier, error = %err, "failed to restore service");
                        failures.push((identifier, err));
                    }
                }
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(MockError::RestoreAll { failures })
                }
            }
        }
    }

    fn record(&self, identifier: &str) -> Result<&ServiceRecord> {
        self.services
            .get(identifier)
            .ok_or_else(|| MockError::unknown_service(identifier))
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for identifier in self.service_list() {
            if let Err(err) = self.restore_service(&identifier) {
                warn!(identifier = %identifier, error = %err, "failed to restore service on drop");
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("services", &self.service_list())
            .finish()
    }
}
