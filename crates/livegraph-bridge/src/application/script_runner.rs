//! Runs graph scripts in the sandbox and validates what they return.
//!
//! The interpreter is synchronous and CPU-bound, so each run is moved onto
//! tokio's blocking pool.  A script that loops for a long time therefore
//! never stalls the reconnect supervisor or the debounce timer.
//!
//! The evaluation itself runs on its own thread with an
//! [`EVAL_STACK_SIZE`] stack.  The interpreter stops deep scripts with a
//! `RangeError` before they reach the end of that stack.
//!
//! The module cache is shared by every run of the same runner until
//! [`ScriptRunner::clear_cache`] is called.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use livegraph_core::domain::change::substitute_command_code;
use livegraph_core::script::{Span, EVAL_STACK_SIZE};
use livegraph_core::{build_graph, validate, EvaluationOutcome, ModuleCache, ModuleLoader, ScriptError};

/// Name of the editor buffer in stack frames.
pub const DOCUMENT_LABEL: &str = "<document>";

/// Sandbox for one document: relative `require` paths resolve against
/// `base_dir`, and loaded modules are memoized in `cache`.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    base_dir: PathBuf,
    cache: Arc<ModuleCache>,
}

impl ScriptRunner {
    /// A runner with a fresh, empty module cache.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_cache(base_dir, Arc::new(ModuleCache::new()))
    }

    /// A runner sharing an existing module cache.
    pub fn with_cache(base_dir: impl Into<PathBuf>, cache: Arc<ModuleCache>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Evaluates `program` on the blocking pool and validates the result.
    ///
    /// Returns `Ok`, `ScriptError`, or `ValidationError`; never
    /// `TransportError`.
    pub async fn run(&self, program: &str) -> EvaluationOutcome {
        let runner = self.clone();
        let program = program.to_string();
        match tokio::task::spawn_blocking(move || runner.run_blocking(&program)).await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                warn!(error = %join_err, "evaluation task did not complete");
                aborted(join_err)
            }
        }
    }

    /// Synchronous form of [`run`](Self::run) for callers without a runtime.
    pub fn run_blocking(&self, program: &str) -> EvaluationOutcome {
        std::thread::scope(|scope| {
            let spawned = std::thread::Builder::new()
                .name("livegraph-eval".to_string())
                .stack_size(EVAL_STACK_SIZE)
                .spawn_scoped(scope, || self.evaluate(program));
            match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    warn!("evaluation thread panicked");
                    aborted("evaluation thread panicked")
                }),
                Err(e) => {
                    warn!(error = %e, "could not start evaluation thread");
                    aborted(e)
                }
            }
        })
    }

    fn evaluate(&self, program: &str) -> EvaluationOutcome {
        let program = substitute_command_code(program);
        let loader = ModuleLoader::new(&self.base_dir, Arc::clone(&self.cache));
        match build_graph(&program, DOCUMENT_LABEL, &loader) {
            Ok(value) => {
                debug!(kind = value.kind(), "program returned");
                validate(&value).into()
            }
            Err(err) => EvaluationOutcome::ScriptError(err),
        }
    }

    /// Forgets every cached module.  Returns how many entries were dropped.
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }
}

fn aborted(reason: impl std::fmt::Display) -> EvaluationOutcome {
    EvaluationOutcome::ScriptError(ScriptError::at(
        format!("Error: evaluation aborted: {reason}"),
        "<program>",
        DOCUMENT_LABEL,
        Span::default(),
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScriptRunner {
        ScriptRunner::new(std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_returned_node_is_validated_and_serialized() {
        // Act
        let outcome = runner().run("return c.top('noise').connect(c.top('level'))").await;

        // Assert
        let EvaluationOutcome::Ok(json) = outcome else {
            panic!("expected Ok, got {outcome:?}");
        };
        let graph: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(graph["/level_top_0"]["inputs"][0], "/noise_top_1");
    }

    #[tokio::test]
    async fn test_syntax_error_is_a_script_error() {
        let outcome = runner().run("let = 3").await;
        assert!(matches!(outcome, EvaluationOutcome::ScriptError(_)), "{outcome:?}");
    }

    #[tokio::test]
    async fn test_non_node_result_is_a_validation_error() {
        // Act
        let outcome = runner().run("return 42").await;

        // Assert
        assert_eq!(
            outcome.status(),
            "Validation failed\nexpected a node or a list of nodes, got number"
        );
    }

    #[test]
    fn test_command_code_placeholder_becomes_program_text() {
        // Arrange: the program stores its own source in a text DAT.
        let program = "return c.dat('text', { text: CommandCode })";

        // Act
        let outcome = runner().run_blocking(program);

        // Assert
        let EvaluationOutcome::Ok(json) = outcome else {
            panic!("expected Ok, got {outcome:?}");
        };
        let graph: serde_json::Value = serde_json::from_str(&json).unwrap();
        let text = graph["/text_dat_0"]["params"]["text"].as_str().unwrap();
        assert!(text.contains("c.dat('text'"), "{text}");
    }

    #[tokio::test]
    async fn test_deep_recursion_with_nested_body_is_a_range_error() {
        // Arrange: every call level nests a node, its params, and a connect.
        let program = "\
            let chain = (n) => n == 0 ? c.top('noise') : c.top('level', { opacity: c.multp(c.fp(0.5), c.addp(1, 2)) }).connect(chain(n - 1))\n\
            return chain(1000)";

        // Act
        let outcome = runner().run(program).await;

        // Assert
        let EvaluationOutcome::ScriptError(err) = outcome else {
            panic!("expected a script error, got {outcome:?}");
        };
        assert_eq!(err.message, "RangeError: Maximum call stack size exceeded");
    }

    #[tokio::test]
    async fn test_recursion_inside_nested_lists_is_a_range_error() {
        let outcome = runner()
            .run("let f = (n) => [[[[[[[[[[ f(n + 1) ]]]]]]]]]]\nreturn f(0)")
            .await;
        assert!(
            outcome.status().starts_with("RangeError: Maximum call stack size exceeded"),
            "{}",
            outcome.status()
        );
    }

    #[tokio::test]
    async fn test_shallow_recursion_still_builds_a_chain() {
        // Act
        let outcome = runner()
            .run("let chain = (n) => n == 0 ? c.top('noise') : c.top('level').connect(chain(n - 1))\nreturn chain(20)")
            .await;

        // Assert
        let EvaluationOutcome::Ok(json) = outcome else {
            panic!("expected Ok, got {outcome:?}");
        };
        let graph: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(graph.as_object().unwrap().len(), 21);
    }

    #[test]
    fn test_clear_cache_on_empty_cache_reports_zero() {
        assert_eq!(runner().clear_cache(), 0);
    }

    #[test]
    fn test_runners_built_with_shared_cache_see_the_same_entries() {
        let cache = Arc::new(ModuleCache::new());
        let a = ScriptRunner::with_cache("/tmp", Arc::clone(&cache));
        let b = ScriptRunner::with_cache("/tmp", Arc::clone(&cache));
        assert!(Arc::ptr_eq(a.cache(), b.cache()));
    }
}
