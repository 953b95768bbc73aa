//! Application layer for livegraph-bridge.
//!
//! Knows *what* an update cycle is and in which order things happen; leaves
//! sockets, files, and output to the infrastructure layer behind traits.

pub mod debounce;
pub mod pipeline;
pub mod script_runner;
pub mod session;
pub mod update_controller;

pub use debounce::Debouncer;
pub use pipeline::{GraphSink, ResultPipeline, TransportError};
pub use script_runner::ScriptRunner;
pub use session::{Command, Session};
pub use update_controller::UpdateController;
