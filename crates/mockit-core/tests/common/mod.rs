//! Fixture modules shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use mockit_core::{ClassBuilder, Function, ModuleTable, ObjectRef, Value};
use parking_lot::Mutex;

pub const REAL_ARCH: &str = "x64";

pub struct Fixture {
    pub modules: ModuleTable,
    pub os: ObjectRef,
    pub http: ObjectRef,
    pub net: ObjectRef,
    pub fs: ObjectRef,
}

/// `os` and `http` singletons, `net.Socket` class, nested `fs.promises`,
/// and a callable root module `client`
pub fn fixture() -> Fixture {
    let modules = ModuleTable::new();

    let os = ObjectRef::new("os");
    os.define_method("arch", |_this, _args| Ok(Value::from(REAL_ARCH)));
    os.define_method("freemem", |_this, _args| Ok(Value::from(1024)));
    os.define_method("cpus", |_this, _args| Ok(Value::from(8)));
    os.define_method("type", |_this, _args| Ok(Value::from("Linux")));
    os.set("EOL", "\n");
    modules.register("os", os.clone());

    let http = ObjectRef::new("http");
    http.define_method("get", |_this, args| {
        // Real implementation: options first, response callback last
        match args.last() {
            Some(Value::Function(callback)) => callback.call(&[Value::from("real response")]),
            _ => Ok(Value::Null),
        }
    });
    modules.register("http", http.clone());

    let net = ObjectRef::new("net");
    net.set("Socket", socket_class());
    modules.register("net", net.clone());

    let fs = ObjectRef::new("fs");
    let promises = ObjectRef::new("fs.promises");
    promises.define_method("readFile", |_this, _args| Ok(Value::from("file contents")));
    fs.set("promises", promises);
    modules.register("fs", fs.clone());

    modules.register(
        "client",
        ClassBuilder::new("Client")
            .method("send", |_this, _args| Ok(Value::from("sent")))
            .build(),
    );

    Fixture {
        modules,
        os,
        http,
        net,
        fs,
    }
}

fn socket_class() -> Function {
    ClassBuilder::new("Socket")
        .init(|this, args| {
            this.set("port", args.first().cloned().unwrap_or(Value::from(80)));
            Ok(())
        })
        .method("write", |this, args| {
            let port = this.get("port").unwrap_or(Value::Null);
            Ok(Value::from(format!("wrote {} to {port}", args.len())))
        })
        .method("end", |_this, _args| Ok(Value::from("closed")))
        .property("bufferSize", 0)
        .build()
}

/// Construct through whatever the module currently exposes, as code under
/// test would
pub fn new_socket(fixture: &Fixture, args: &[Value]) -> anyhow::Result<ObjectRef> {
    let class = fixture
        .net
        .get("Socket")
        .and_then(|value| value.as_function().cloned())
        .ok_or_else(|| anyhow::anyhow!("net.Socket is not a class"))?;
    as_object(class.construct(args)?)
}

pub fn new_client(fixture: &Fixture) -> anyhow::Result<ObjectRef> {
    let class = fixture
        .modules
        .require("client")?
        .as_function()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("client is not callable"))?;
    as_object(class.construct(&[])?)
}

fn as_object(value: Value) -> anyhow::Result<ObjectRef> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("expected an object, got {}", value.type_name()))
}

pub fn constant(value: &'static str) -> Function {
    Function::native(value, move |_| Ok(Value::from(value)))
}

/// A callback that stores the arguments of its last call
pub fn recorder() -> (Function, Arc<Mutex<Option<Vec<Value>>>>) {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let callback = Function::native("recorder", move |args| {
        *sink.lock() = Some(args.to_vec());
        Ok(Value::Null)
    });
    (callback, seen)
}
