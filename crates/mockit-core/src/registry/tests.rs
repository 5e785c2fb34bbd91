// Registry invariants that need access to service internals

use pretty_assertions::assert_eq;

use super::*;
use crate::{
    error::PatchError,
    object::ClassBuilder,
    patch::PatchHandle,
    resolver::ModuleTable,
};

fn fixture() -> (ModuleTable, ObjectRef) {
    let modules = ModuleTable::new();
    let os = ObjectRef::new("os");
    os.define_method("arch", |_this, _args| Ok(Value::from("x64")));
    os.define_method("freemem", |_this, _args| Ok(Value::from(1024)));
    modules.register("os", os.clone());

    let net = ObjectRef::new("net");
    net.set(
        "Socket",
        ClassBuilder::new("Socket")
            .method("write", |_this, _args| Ok(Value::from("wrote")))
            .method("end", |_this, _args| Ok(Value::from("ended")))
            .property("timeout", 0)
            .build(),
    );
    modules.register("net", net);
    (modules, os)
}

fn constant(value: &'static str) -> Function {
    Function::native(value, move |_| Ok(Value::from(value)))
}

fn patch_counts(registry: &Registry, identifier: &str) -> Vec<(String, usize)> {
    let record = &registry.services[identifier];
    let state = record.state.lock();
    state
        .method_mocks
        .iter()
        .map(|(method, entry)| (method.clone(), entry.patch_count()))
        .collect()
}

fn construct(modules: &ModuleTable, path: &[&str]) -> anyhow::Result<ObjectRef> {
    let mut value = modules.require(path[0])?;
    for segment in &path[1..] {
        value = value
            .as_object()
            .and_then(|obj| obj.get(segment))
            .ok_or_else(|| anyhow::anyhow!("missing {segment}"))?;
    }
    let class = value
        .as_function()
        .ok_or_else(|| anyhow::anyhow!("not a class"))?;
    class
        .construct(&[])?
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("constructor returned a non-object"))
}

#[test]
fn test_singleton_entries_hold_one_patch() -> anyhow::Result<()> {
    let (modules, _os) = fixture();
    let mut registry = Registry::new(modules);

    registry.mock("os", "arch", constant("x128"))?;
    registry.mock("os", "freemem", constant("12345"))?;
    registry.mock("os", "arch", constant("x256"))?;

    // Re-mocking moves the method to the end, like delete-then-insert
    assert_eq!(
        patch_counts(&registry, "os"),
        vec![("freemem".to_string(), 1), ("arch".to_string(), 1)]
    );
    Ok(())
}

#[test]
fn test_instance_entries_hold_one_patch_per_instance() -> anyhow::Result<()> {
    let (modules, _os) = fixture();
    let mut registry = Registry::new(modules.clone());

    registry.mock("net.Socket", "write", constant("mock write"))?;
    assert_eq!(patch_counts(&registry, "net.Socket"), vec![("write".to_string(), 0)]);

    for _ in 0..3 {
        construct(&modules, &["net", "Socket"])?;
    }
    registry.mock("net.Socket", "end", constant("mock end"))?;

    assert_eq!(
        patch_counts(&registry, "net.Socket"),
        vec![("write".to_string(), 3), ("end".to_string(), 3)]
    );
    Ok(())
}

#[test]
fn test_failed_first_mock_leaves_no_service() -> anyhow::Result<()> {
    let (modules, _os) = fixture();
    let net = modules.require("net")?;
    let original = net.as_object().and_then(|net| net.get_own("Socket"));
    let mut registry = Registry::new(modules.clone());

    assert!(matches!(
        registry.mock("net.Socket", "timeout", constant("x")),
        Err(MockError::MemberMismatch { .. })
    ));
    assert!(registry.services.is_empty());

    // The constructor patch was rolled back with the service
    let current = net.as_object().and_then(|net| net.get_own("Socket"));
    assert_eq!(current, original);
    Ok(())
}

#[test]
fn test_tracker_does_not_own_the_class() -> anyhow::Result<()> {
    let (modules, _os) = fixture();
    let mut registry = Registry::new(modules.clone());
    registry.mock("net.Socket", "write", constant("mock write"))?;

    let class = {
        let record = &registry.services["net.Socket"];
        let state = record.state.lock();
        let instances = state.instances.as_ref().expect("instantiable service");
        instances.original_class.clone()
    };
    assert!(class.upgrade().is_some());

    // Replacing the module drops the displaced class and the constructor
    // patch's reference to it once the service is restored
    modules.register("net", ObjectRef::new("net"));
    registry.restore_service("net.Socket")?;
    assert!(class.upgrade().is_none());
    Ok(())
}

#[test]
fn test_remock_undoes_previous_patch_before_installing() -> anyhow::Result<()> {
    let (modules, os) = fixture();
    let mut registry = Registry::new(modules);

    registry.mock("os", "arch", constant("x128"))?;
    let first = os.get_own("arch");
    registry.mock("os", "arch", constant("x256"))?;
    let second = os.get_own("arch");
    assert_ne!(first, second);

    // Restoring once brings back the real member; nothing stacked underneath
    registry.restore_method("os", "arch")?;
    assert_eq!(os.invoke("arch", &[])?, Value::from("x64"));
    Ok(())
}

/// Refuses to patch one member name and remembers the object it refused
struct RefusingPatcher {
    member: &'static str,
    refused: Mutex<Option<ObjectRef>>,
}

impl MemberPatcher for RefusingPatcher {
    fn install(
        &self,
        target: &ObjectRef,
        member: &str,
        replacement: Function,
    ) -> std::result::Result<PatchHandle, PatchError> {
        if member == self.member {
            *self.refused.lock() = Some(target.clone());
            return Err(PatchError::Displaced {
                member: member.to_string(),
                object: target.name(),
            });
        }
        OwnMemberPatcher.install(target, member, replacement)
    }
}

#[test]
fn test_failed_adoption_leaves_instance_untracked() -> anyhow::Result<()> {
    let (modules, _os) = fixture();
    let patcher = Arc::new(RefusingPatcher {
        member: "end",
        refused: Mutex::new(None),
    });
    let mut registry = Registry::from_parts(
        Arc::new(modules.clone()),
        patcher.clone(),
        MockitConfig::default(),
    );

    registry.mock("net.Socket", "write", constant("mock write"))?;
    registry.mock("net.Socket", "end", constant("mock end"))?;

    assert!(construct(&modules, &["net", "Socket"]).is_err());
    let instance = patcher
        .refused
        .lock()
        .clone()
        .expect("patch on the new instance was attempted");

    // The patch that did go in was rolled back and nothing is tracked
    assert!(!instance.has_own("write"));
    assert_eq!(instance.invoke("write", &[])?, Value::from("wrote"));
    assert!(registry.live_instances("net.Socket")?.is_empty());
    assert_eq!(
        patch_counts(&registry, "net.Socket"),
        vec![("write".to_string(), 0), ("end".to_string(), 0)]
    );
    Ok(())
}
