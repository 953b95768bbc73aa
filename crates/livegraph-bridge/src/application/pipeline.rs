//! The result pipeline: evaluate → validate → send, folded into one status.
//!
//! ```text
//! program ──ScriptRunner──► Ok(graph) ──GraphSink::send──► Ok          → "Correct"
//!                  │                           │
//!                  ├─► ScriptError             └─► TransportError     → "Problem sending\n…"
//!                  └─► ValidationError                                → "Validation failed\n…"
//! ```
//!
//! The first failure short-circuits: a graph that fails validation is never
//! handed to the sink.  Every path ends in exactly one
//! [`EvaluationOutcome`], so [`ResultPipeline::run`] always returns a status
//! string and never an error.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use livegraph_core::{EvaluationOutcome, FrameError};

use super::script_runner::ScriptRunner;

/// Failures while handing a serialized graph to the engine.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The payload could not be framed for the wire.
    #[error("could not frame graph: {0}")]
    Frame(#[from] FrameError),

    /// Writing to a live connection failed.
    #[error("write to engine failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Where serialized graphs go.
///
/// The production implementation is
/// [`ReconnectingChannel`](crate::infrastructure::channel::ReconnectingChannel);
/// tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphSink: Send + Sync {
    /// Sends one serialized graph.  Must return `Ok(())` when the sink is
    /// simply not connected.
    async fn send(&self, payload: &str) -> Result<(), TransportError>;
}

/// Runs one program through evaluation, validation, and transmission.
pub struct ResultPipeline {
    runner: ScriptRunner,
    sink: Arc<dyn GraphSink>,
}

impl ResultPipeline {
    pub fn new(runner: ScriptRunner, sink: Arc<dyn GraphSink>) -> Self {
        Self { runner, sink }
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    /// Produces the single outcome for `program`.
    pub async fn evaluate(&self, program: &str) -> EvaluationOutcome {
        let outcome = self.runner.run(program).await;
        let EvaluationOutcome::Ok(serialized) = outcome else {
            return outcome;
        };

        match self.sink.send(&serialized).await {
            Ok(()) => {
                debug!(bytes = serialized.len(), "graph handed to sink");
                EvaluationOutcome::Ok(serialized)
            }
            Err(e) => EvaluationOutcome::TransportError(e.to_string()),
        }
    }

    /// Evaluates `program` and renders the outcome as a status string.
    pub async fn run(&self, program: &str) -> String {
        self.evaluate(program).await.status()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
