use std::{fmt, sync::Arc};

use anyhow::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ObjectError,
    value::{Function, Value},
};

/// Object identity, stable for the lifetime of the object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", &self.0.to_string()[..8])
    }
}

/// Object record: named members plus an optional prototype to fall back on
#[derive(Debug)]
pub struct Object {
    pub id: ObjectId,
    pub name: String,
    pub members: IndexMap<String, Value>,
    pub prototype: Option<ObjectRef>,
}

/// Shared, mutable handle to an object. Cloning shares the object.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Object>>);

impl ObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), None)
    }

    pub fn with_prototype(name: impl Into<String>, prototype: ObjectRef) -> Self {
        Self::from_parts(name.into(), Some(prototype))
    }

    fn from_parts(name: String, prototype: Option<ObjectRef>) -> Self {
        Self(Arc::new(RwLock::new(Object {
            id: ObjectId::new(),
            name,
            members: IndexMap::new(),
            prototype,
        })))
    }

    pub fn id(&self) -> ObjectId {
        self.0.read().id
    }

    pub fn name(&self) -> String {
        self.0.read().name.clone()
    }

    pub fn prototype(&self) -> Option<ObjectRef> {
        self.0.read().prototype.clone()
    }

    /// Look up a member on the object, then along its prototype chain
    pub fn get(&self, member: &str) -> Option<Value> {
        let mut current = self.clone();
        loop {
            let next = {
                let obj = current.0.read();
                if let Some(value) = obj.members.get(member) {
                    return Some(value.clone());
                }
                obj.prototype.clone()
            };
            current = next?;
        }
    }

    pub fn get_own(&self, member: &str) -> Option<Value> {
        self.0.read().members.get(member).cloned()
    }

    pub fn has(&self, member: &str) -> bool {
        self.get(member).is_some()
    }

    pub fn has_own(&self, member: &str) -> bool {
        self.0.read().members.contains_key(member)
    }

    /// Set an own member, returning the own value it replaced
    pub fn set(&self, member: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.write().members.insert(member.to_string(), value.into())
    }

    /// Remove an own member. Inherited members become visible again.
    pub fn remove(&self, member: &str) -> Option<Value> {
        self.0.write().members.shift_remove(member)
    }

    pub fn member_names(&self) -> Vec<String> {
        self.0.read().members.keys().cloned().collect()
    }

    /// Define a method taking the receiver and arguments
    pub fn define_method<F>(&self, name: &str, body: F) -> &Self
    where
        F: Fn(&ObjectRef, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.set(name, method(name, body));
        self
    }

    /// Call a member with this object as receiver
    pub fn invoke(&self, member: &str, args: &[Value]) -> Result<Value> {
        match self.get(member) {
            Some(Value::Function(func)) => func.call_method(self, args),
            Some(other) => {
                Err(ObjectError::not_callable(member, &self.name(), other.type_name()).into())
            }
            None => Err(ObjectError::member_not_found(member, &self.name()).into()),
        }
    }

    /// True when the instance's prototype chain reaches `prototype`
    pub fn inherits_from(&self, prototype: &ObjectRef) -> bool {
        let mut current = self.prototype();
        while let Some(proto) = current {
            if proto.ptr_eq(prototype) {
                return true;
            }
            current = proto.prototype();
        }
        false
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Members may refer back to this object; print identity only
        match self.0.try_read() {
            Some(obj) => write!(f, "Object({} {})", obj.name, obj.id),
            None => write!(f, "Object(<locked>)"),
        }
    }
}

fn method<F>(name: &str, body: F) -> Function
where
    F: Fn(&ObjectRef, &[Value]) -> Result<Value> + Send + Sync + 'static,
{
    let method_name = name.to_string();
    Function::new(name, move |this, args| match this {
        Some(this) => body(this, args),
        None => Err(ObjectError::MissingReceiver {
            method: method_name.clone(),
        }
        .into()),
    })
}

type Initializer = Box<dyn Fn(&ObjectRef, &[Value]) -> Result<()> + Send + Sync>;

/// Builds a class: a function with a prototype holding the shared methods
///
/// ```
/// use mockit_core::{ClassBuilder, Value};
///
/// let socket = ClassBuilder::new("Socket")
///     .method("write", |_this, args| Ok(Value::from(args.len() as i64)))
///     .build();
/// let instance = socket.construct(&[]).unwrap();
/// let instance = instance.as_object().unwrap();
/// assert_eq!(instance.invoke("write", &[Value::Null]).unwrap(), Value::Integer(1));
/// ```
pub struct ClassBuilder {
    name: String,
    prototype: ObjectRef,
    init: Option<Initializer>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let prototype = ObjectRef::new(format!("{name}.prototype"));
        Self {
            name,
            prototype,
            init: None,
        }
    }

    pub fn method<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.prototype.set(name, method(name, body));
        self
    }

    /// Shared non-function member on the prototype
    pub fn property(self, name: &str, value: impl Into<Value>) -> Self {
        self.prototype.set(name, value);
        self
    }

    pub fn init<F>(mut self, init: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Box::new(init));
        self
    }

    pub fn build(self) -> Function {
        let init = self.init;
        let class_name = self.name.clone();
        Function::class(self.name, self.prototype, move |this, args| {
            let this = this.ok_or_else(|| ObjectError::MissingReceiver {
                method: class_name.clone(),
            })?;
            if let Some(init) = &init {
                init(this, args)?;
            }
            Ok(Value::Null)
        })
    }
}
