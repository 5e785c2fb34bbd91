//! Dynamic values passed through intercepted members
//!
//! Functions are native closures with identity semantics: two `Function`
//! handles are equal only when they share the same allocation. A function
//! carrying a prototype object is a class and can construct instances.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use anyhow::Result;
use indexmap::IndexMap;

use crate::{error::ObjectError, object::ObjectRef};

/// Signature of every native function body: optional receiver, then arguments
pub type NativeFn = dyn Fn(Option<&ObjectRef>, &[Value]) -> Result<Value> + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(ObjectRef),
    Function(Function),
}

impl Value {
    /// Runtime kind name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                let mut first = true;
                for (key, value) in map {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                    first = false;
                }
                write!(f, "}}")
            }
            Value::Object(obj) => write!(f, "{} {}", obj.name(), obj.id()),
            Value::Function(func) => write!(f, "fn {}()", func.name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(fl: f64) -> Self {
        Value::Float(fl)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

struct FunctionInner {
    name: String,
    body: Box<NativeFn>,
    prototype: Option<ObjectRef>,
}

/// Shared handle to a native function or class
#[derive(Clone)]
pub struct Function {
    inner: Arc<FunctionInner>,
}

impl Function {
    /// Create a function whose body sees the receiver it was invoked on
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Option<&ObjectRef>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(FunctionInner {
                name: name.into(),
                body: Box::new(body),
                prototype: None,
            }),
        }
    }

    /// Create a function that ignores its receiver
    pub fn native<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, move |_this, args| body(args))
    }

    /// Create a class: `body` runs as the initializer of each new instance
    pub(crate) fn class<F>(name: impl Into<String>, prototype: ObjectRef, body: F) -> Self
    where
        F: Fn(Option<&ObjectRef>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(FunctionInner {
                name: name.into(),
                body: Box::new(body),
                prototype: Some(prototype),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Prototype shared by instances; present only for classes
    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.inner.prototype.as_ref()
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.inner.body)(None, args)
    }

    pub fn call_method(&self, this: &ObjectRef, args: &[Value]) -> Result<Value> {
        (self.inner.body)(Some(this), args)
    }

    /// Construct an instance. Classes allocate an object linked to their
    /// prototype and run the initializer on it; plain functions act as
    /// factories and return whatever the call returns.
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        match &self.inner.prototype {
            Some(prototype) => {
                let instance = ObjectRef::with_prototype(self.name(), prototype.clone());
                (self.inner.body)(Some(&instance), args)?;
                Ok(Value::Object(instance))
            }
            None => self.call(args),
        }
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakFunction {
        WeakFunction {
            name: self.inner.name.clone(),
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.inner.name)
            .field("class", &self.inner.prototype.is_some())
            .field("body", &"<native>")
            .finish()
    }
}

/// Non-owning reference to a function
#[derive(Clone)]
pub struct WeakFunction {
    name: String,
    inner: Weak<FunctionInner>,
}

impl WeakFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upgrade(&self) -> Option<Function> {
        self.inner.upgrade().map(|inner| Function { inner })
    }

    /// Upgrade or report the class as gone
    pub fn require(&self) -> std::result::Result<Function, ObjectError> {
        self.upgrade().ok_or_else(|| ObjectError::ClassDropped {
            class: self.name.clone(),
        })
    }
}

impl fmt::Debug for WeakFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakFunction({})", self.name)
    }
}
