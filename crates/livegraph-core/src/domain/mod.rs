//! Domain layer: pure types with no I/O.
//!
//! - [`change`] computes the added/removed-line summary between two document
//!   snapshots and renders it as a token that can be spliced into source.
//! - [`graph`] is the node-graph model produced by evaluating a script, and
//!   the validator that turns it into the engine's JSON representation.

pub mod change;
pub mod graph;

pub use change::{extract, ChangeKind, ChangeRecord, LineChange};
pub use graph::{Graph, Node, OpFamily, ParamValue, ValidationError};
