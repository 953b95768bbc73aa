//! One update cycle, and the debounced trigger that starts it.
//!
//! # A cycle (for beginners)
//!
//! ```text
//! read document ─► extract changes vs. previous snapshot ─► previous := current
//!      ─► substitute `Changes` token ─► ResultPipeline::run ─► status surface
//! ```
//!
//! The previous snapshot is replaced *before* evaluation, whatever the
//! outcome.  A program that fails still moves the baseline forward, so the
//! next cycle reports only what changed since the failing text.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use livegraph_core::domain::change::substitute_changes;
use livegraph_core::extract;

use super::debounce::Debouncer;
use super::pipeline::ResultPipeline;
use crate::infrastructure::document::DocumentSource;
use crate::infrastructure::status::StatusSurface;

/// Status header when the document cannot be read.
pub const READ_FAILED_STATUS: &str = "Problem reading document";

/// Owns the previous-text snapshot and runs update cycles.
pub struct UpdateController {
    document: Arc<dyn DocumentSource>,
    pipeline: ResultPipeline,
    status: Arc<dyn StatusSurface>,
    previous: Mutex<String>,
    debouncer: Debouncer,
}

impl UpdateController {
    pub fn new(
        document: Arc<dyn DocumentSource>,
        pipeline: ResultPipeline,
        status: Arc<dyn StatusSurface>,
        debounce_window: Duration,
    ) -> Self {
        Self {
            document,
            pipeline,
            status,
            previous: Mutex::new(String::new()),
            debouncer: Debouncer::new(debounce_window),
        }
    }

    pub fn pipeline(&self) -> &ResultPipeline {
        &self.pipeline
    }

    /// The text the next cycle will diff against.
    pub fn previous_text(&self) -> String {
        self.previous
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one full cycle and returns the status block it reported.
    pub async fn update(&self) -> String {
        let status = self.cycle().await;
        self.status.clear();
        self.status.append_line(&status);
        status
    }

    async fn cycle(&self) -> String {
        let current = match self.document.read_text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "document read failed");
                return format!("{READ_FAILED_STATUS}\n{e}");
            }
        };

        let token = {
            let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);
            let record = extract(&previous, &current);
            debug!(changes = record.len(), "extracted changes");
            *previous = current.clone();
            record.to_token()
        };

        let program = substitute_changes(&current, &token);
        self.pipeline.run(&program).await
    }

    /// Records editor activity; a cycle runs once the debounce window passes
    /// with no further activity.
    pub fn on_editor_activity(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        self.debouncer.schedule(move || async move {
            controller.update().await;
        });
    }

    /// Drops a pending debounced cycle.  A cycle already running completes.
    pub fn cancel_pending(&self) -> bool {
        self.debouncer.cancel()
    }

    pub fn has_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::MockGraphSink;
    use crate::application::script_runner::ScriptRunner;
    use crate::infrastructure::document::MemoryDocument;
    use crate::infrastructure::status::RecordingStatus;

    struct Fixture {
        document: Arc<MemoryDocument>,
        status: Arc<RecordingStatus>,
        controller: Arc<UpdateController>,
    }

    fn fixture(text: &str, sink: MockGraphSink) -> Fixture {
        let document = Arc::new(MemoryDocument::new(text, std::env::temp_dir()));
        let status = Arc::new(RecordingStatus::new());
        let pipeline = ResultPipeline::new(ScriptRunner::new(std::env::temp_dir()), Arc::new(sink));
        let controller = Arc::new(UpdateController::new(
            document.clone(),
            pipeline,
            status.clone(),
            Duration::from_millis(200),
        ));
        Fixture {
            document,
            status,
            controller,
        }
    }

    fn accepting_sink() -> MockGraphSink {
        let mut sink = MockGraphSink::new();
        sink.expect_send().returning(|_| Ok(()));
        sink
    }

    #[tokio::test]
    async fn test_update_reports_correct_and_replaces_snapshot() {
        // Arrange
        let f = fixture("return c.top('noise')", accepting_sink());

        // Act
        let status = f.controller.update().await;

        // Assert
        assert_eq!(status, "Correct");
        assert_eq!(f.status.lines(), vec!["Correct".to_string()]);
        assert_eq!(f.controller.previous_text(), "return c.top('noise')");
    }

    #[tokio::test]
    async fn test_failing_program_still_replaces_snapshot() {
        // Arrange
        let f = fixture("return c.top(", MockGraphSink::new());

        // Act
        let status = f.controller.update().await;

        // Assert
        assert_ne!(status, "Correct");
        assert_eq!(f.controller.previous_text(), "return c.top(");
        assert_eq!(f.status.clear_count(), 1);
    }

    #[tokio::test]
    async fn test_changes_token_lists_lines_since_previous_cycle() {
        // Arrange: the graph echoes the changes token into a text DAT.
        let mut sink = MockGraphSink::new();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let record = Arc::clone(&seen);
        sink.expect_send().returning(move |payload| {
            record.lock().unwrap().push(payload.to_string());
            Ok(())
        });
        let f = fixture("return c.dat('text', { text: `Changes` })", sink);
        f.controller.update().await;

        // Act
        f.document
            .set_text("let extra = 1\nreturn c.dat('text', { text: `Changes` })");
        f.controller.update().await;

        // Assert
        let payloads = seen.lock().unwrap();
        let second: serde_json::Value = serde_json::from_str(&payloads[1]).unwrap();
        let text = second["/text_dat_0"]["params"]["text"].as_str().unwrap();
        assert_eq!(text, r#""added\tlet extra = 1""#);
    }

    #[tokio::test]
    async fn test_activity_burst_runs_a_single_cycle() {
        // Arrange
        let mut sink = MockGraphSink::new();
        sink.expect_send().times(1).returning(|_| Ok(()));
        let f = fixture("return c.chop('lfo')", sink);

        // Act: two events well inside one window.
        f.controller.on_editor_activity();
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.controller.on_editor_activity();
        for _ in 0..200 {
            if f.status.clear_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Assert
        assert_eq!(f.status.clear_count(), 1);
        assert_eq!(f.status.last_status().as_deref(), Some("Correct"));
        assert!(!f.controller.has_pending());
    }
}
