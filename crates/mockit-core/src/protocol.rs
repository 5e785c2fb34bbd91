//! Calling-convention normalization
//!
//! Intercepted members receive raw argument lists. Before they reach a
//! replacement, the arguments are classified by where the callback sits,
//! first match wins:
//!
//! | arguments                   | replacement receives          |
//! |-----------------------------|-------------------------------|
//! | none                        | `()`                          |
//! | callback first, then more   | `(callback, [rest..])`        |
//! | callback only               | `(callback)`                  |
//! | callback last               | `([all but last..], callback)`|
//! | no callback                 | `([all..], null)`             |
//!
//! This is a heuristic over untyped calls. A positional argument that
//! happens to be a function is taken for a callback.

use anyhow::Result;

use crate::value::{Function, Value};

/// Shape of a call after classification
#[derive(Debug, Clone, PartialEq)]
pub enum CallShape {
    Empty,
    CallbackOnly(Function),
    CallbackFirst { callback: Function, args: Vec<Value> },
    CallbackLast { args: Vec<Value>, callback: Function },
    Positional(Vec<Value>),
}

impl CallShape {
    /// Argument list handed to the replacement
    pub fn into_args(self) -> Vec<Value> {
        match self {
            CallShape::Empty => Vec::new(),
            CallShape::CallbackOnly(callback) => vec![Value::Function(callback)],
            CallShape::CallbackFirst { callback, args } => {
                vec![Value::Function(callback), Value::List(args)]
            }
            CallShape::CallbackLast { args, callback } => {
                vec![Value::List(args), Value::Function(callback)]
            }
            CallShape::Positional(args) => vec![Value::List(args), Value::Null],
        }
    }

    pub fn callback(&self) -> Option<&Function> {
        match self {
            CallShape::CallbackOnly(callback)
            | CallShape::CallbackFirst { callback, .. }
            | CallShape::CallbackLast { callback, .. } => Some(callback),
            CallShape::Empty | CallShape::Positional(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CallShape::Empty => "empty",
            CallShape::CallbackOnly(_) => "callback-only",
            CallShape::CallbackFirst { .. } => "callback-first",
            CallShape::CallbackLast { .. } => "callback-last",
            CallShape::Positional(_) => "positional",
        }
    }
}

pub fn classify(args: &[Value]) -> CallShape {
    match args {
        [] => CallShape::Empty,
        [Value::Function(callback)] => CallShape::CallbackOnly(callback.clone()),
        [Value::Function(callback), rest @ ..] => CallShape::CallbackFirst {
            callback: callback.clone(),
            args: rest.to_vec(),
        },
        [init @ .., Value::Function(callback)] => CallShape::CallbackLast {
            args: init.to_vec(),
            callback: callback.clone(),
        },
        _ => CallShape::Positional(args.to_vec()),
    }
}

/// Classify `args` and call `replacement` with the normalized shape,
/// returning its result untouched
pub fn forward(replacement: &Function, args: &[Value]) -> Result<Value> {
    let shape = classify(args);
    tracing::trace!(
        replacement = replacement.name(),
        shape = shape.label(),
        "forwarding intercepted call"
    );
    replacement.call(&shape.into_args())
}
