//! The graph-script language.
//!
//! # Pipeline (for beginners)
//!
//! ```text
//! source text ──lexer──► tokens ──parser──► AST ──interpreter──► Value
//!                                                                 │
//!                                              validate(Value) ◄──┘
//!                                                   │
//!                                                   ▼
//!                                          serialized graph JSON
//! ```
//!
//! A script is a short program that builds nodes with the `c` namespace and
//! `return`s the output node (or a list of output nodes):
//!
//! ```text
//! let noise = c.top("noise", { period: 2 })
//! let level = noise.connect(c.top("level", { opacity: c.fp(0.5) }))
//! return level.out()
//! ```
//!
//! [`build_graph`] runs the program and [`validate`] checks and serializes
//! whatever it returned.  The two are separate so that the caller can report
//! a script failure and a validation failure differently.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod value;

pub use error::{ScriptError, Span};
pub use interpreter::{EVAL_STACK_SIZE, MAX_CALL_DEPTH, MAX_EVAL_DEPTH};
pub use modules::{ModuleCache, ModuleLoader};
pub use value::Value;

use crate::domain::graph::{Graph, ValidationError};

/// Runs `source` and returns the value of its first `return`.
///
/// `file` names the source in stack frames (`<document>` for the editor
/// buffer).  `require` calls go through `loader`.
///
/// # Errors
///
/// Returns a [`ScriptError`] for syntax errors, runtime errors, and values
/// passed to `throw`.
pub fn build_graph(source: &str, file: &str, loader: &ModuleLoader) -> Result<Value, ScriptError> {
    interpreter::run_program(source, file, loader)
}

/// Checks that `value` is a node or a (possibly nested) list of nodes and
/// serializes the resulting graph.
///
/// # Errors
///
/// Returns a [`ValidationError`] when `value` is not made of nodes or the
/// graph breaks a structural rule.
pub fn validate(value: &Value) -> Result<String, ValidationError> {
    let mut roots = Vec::new();
    builtins::collect_nodes(value, &mut roots).map_err(|kind| {
        ValidationError::single(format!("expected a node or a list of nodes, got {kind}"))
    })?;
    Graph::new(roots).validate()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
