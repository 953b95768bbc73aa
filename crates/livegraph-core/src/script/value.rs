//! Runtime values and lexical environments.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::graph::{Node, ParamValue};

use super::ast::FunctionDef;
use super::builtins::Builtin;
use super::parser::format_number;

/// A value produced while running a script.
///
/// Values are immutable and `Send + Sync`, so a module's exported value can
/// live in the shared [`ModuleCache`](super::ModuleCache) and be reused by
/// later evaluations on other threads.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(Arc<Node>),
    Param(ParamValue),
    Function(Arc<Closure>),
    Builtin(Builtin),
    /// The graph-building namespace `c`.
    Namespace,
    /// A method looked up on a value, waiting to be called.
    Method(Box<Value>, Method),
}

/// Methods available on nodes and lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Connect,
    Run,
    Out,
    Map,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Connect => "connect",
            Method::Run => "run",
            Method::Out => "out",
            Method::Map => "map",
        }
    }
}

/// An arrow function together with the scope it was created in.
#[derive(Debug)]
pub struct Closure {
    pub def: Arc<FunctionDef>,
    pub env: Env,
    /// Name of the `let` binding that introduced the function, if any.
    pub name: Option<String>,
    /// File the function was defined in, for stack frames.
    pub file: Arc<str>,
}

impl Closure {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

impl Value {
    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "object",
            Value::Node(_) => "node",
            Value::Param(_) => "parameter",
            Value::Function(_) | Value::Builtin(_) | Value::Method(..) => "function",
            Value::Namespace => "namespace",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// The text a value turns into when printed or concatenated.
    pub fn to_display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(","),
            Value::Map(_) => "[object Object]".to_string(),
            Value::Node(node) => node.qualified_type(),
            Value::Param(param) => format!("[{} parameter]", param.kind_name()),
            Value::Function(closure) => format!("[function {}]", closure.display_name()),
            Value::Builtin(builtin) => format!("[function {}]", builtin.name()),
            Value::Method(_, method) => format!("[function {}]", method.name()),
            Value::Namespace => "[namespace c]".to_string(),
        }
    }

    /// Script-level `==`: by value for data, by identity for nodes and
    /// functions.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loosely_equals(vb))
            }
            (Value::Node(a), Value::Node(b)) => Arc::ptr_eq(a, b),
            (Value::Param(a), Value::Param(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Namespace, Value::Namespace) => true,
            _ => false,
        }
    }
}

/// A persistent chain of bindings.  Binding a name never mutates the
/// existing chain, so closures keep seeing the scope they were created in.
#[derive(Debug, Clone, Default)]
pub struct Env(Option<Arc<Binding>>);

#[derive(Debug)]
struct Binding {
    name: String,
    value: Value,
    parent: Env,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new environment with `name` bound on top of `self`.
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Env {
        Env(Some(Arc::new(Binding {
            name: name.into(),
            value,
            parent: self.clone(),
        })))
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut current = self.0.as_deref();
        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.value);
            }
            current = binding.parent.0.as_deref();
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
