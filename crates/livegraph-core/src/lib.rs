//! # livegraph-core
//!
//! Shared library for LiveGraph containing the change extractor, the
//! graph-script interpreter, the node-graph model with its validator, and the
//! wire framing used to ship serialized graphs to the rendering engine.
//!
//! This crate has zero dependencies on sockets, timers, async runtimes, or the
//! editing surface.  Everything here is a pure function of its inputs, with
//! two exceptions: `require` reads helper scripts from disk, and the module
//! cache is an explicit object the caller owns.
//!
//! # Architecture overview (for beginners)
//!
//! LiveGraph is a live-coding bridge: while you type a graph script, the
//! bridge re-evaluates it, turns the result into a declarative node graph, and
//! streams that graph to a long-lived rendering engine over TCP.
//!
//! This crate is the part of that pipeline that does not touch the outside
//! world:
//!
//! - **`domain`** – The change extractor (what lines were added or removed
//!   since the last evaluation) and the node-graph model (operators,
//!   parameters, connections) together with validation and serialization.
//!
//! - **`script`** – A small sandboxed script language.  Source text is
//!   tokenised, parsed into an AST, and interpreted against exactly three
//!   capabilities: the graph-building namespace `c`, the `require` module
//!   hook, and the finishing step that hands the returned value to
//!   validation.
//!
//! - **`protocol`** – How a serialized graph travels on the wire: one
//!   newline-terminated UTF-8 line per update.
//!
//! - **`outcome`** – The single result type of one update cycle and the way
//!   it is rendered for the status surface.

pub mod domain;
pub mod outcome;
pub mod protocol;
pub mod script;

// Re-export the most-used items at the crate root so callers can write
// `livegraph_core::extract` instead of `livegraph_core::domain::change::extract`.
pub use domain::change::{extract, ChangeKind, ChangeRecord, LineChange};
pub use domain::graph::{Graph, Node, OpFamily, ParamValue, ValidationError};
pub use outcome::EvaluationOutcome;
pub use protocol::frame::{encode_frame, FrameDecoder, FrameError};
pub use script::{build_graph, validate, ModuleCache, ModuleLoader, ScriptError, Value};
