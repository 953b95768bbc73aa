//! The result of one update cycle and its status rendering.
//!
//! Exactly one [`EvaluationOutcome`] is produced per cycle.  The status
//! surface never sees the variants directly; it receives the string produced
//! by [`EvaluationOutcome::status`]:
//!
//! | Variant           | Status text                                  |
//! |-------------------|----------------------------------------------|
//! | `Ok`              | `Correct`                                    |
//! | `ScriptError`     | message line, then one line per stack frame  |
//! | `ValidationError` | `Validation failed`, then one line per detail |
//! | `TransportError`  | `Problem sending`, then the reason           |

use crate::domain::graph::ValidationError;
use crate::script::ScriptError;

/// The status line reported for a successful cycle.
pub const CORRECT_STATUS: &str = "Correct";

/// Header line of a validation failure block.
pub const VALIDATION_FAILED_STATUS: &str = "Validation failed";

/// Header line of a transport failure block.
pub const TRANSPORT_FAILED_STATUS: &str = "Problem sending";

/// The single outcome of evaluating, validating, and transmitting a program.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// The serialized graph that was produced (and handed to the transport).
    Ok(String),
    /// The program threw, failed to parse, or failed at run time.
    ScriptError(ScriptError),
    /// The returned value was not a structurally valid graph.
    ValidationError(ValidationError),
    /// The transport failed while writing on a live connection.
    TransportError(String),
}

impl EvaluationOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, EvaluationOutcome::Ok(_))
    }

    /// Renders the outcome as the block shown on the status surface.
    ///
    /// The result is never empty.
    pub fn status(&self) -> String {
        match self {
            EvaluationOutcome::Ok(_) => CORRECT_STATUS.to_string(),
            EvaluationOutcome::ScriptError(err) => std::iter::once(err.message.as_str())
                .chain(err.stack.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            EvaluationOutcome::ValidationError(err) => std::iter::once(VALIDATION_FAILED_STATUS)
                .chain(err.details.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            EvaluationOutcome::TransportError(reason) => {
                format!("{TRANSPORT_FAILED_STATUS}\n{reason}")
            }
        }
    }
}

impl From<Result<String, ValidationError>> for EvaluationOutcome {
    fn from(result: Result<String, ValidationError>) -> Self {
        match result {
            Ok(serialized) => EvaluationOutcome::Ok(serialized),
            Err(err) => EvaluationOutcome::ValidationError(err),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_status_is_correct() {
        let outcome = EvaluationOutcome::Ok("{}".to_string());
        assert_eq!(outcome.status(), "Correct");
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_script_error_status_joins_message_and_stack() {
        // Arrange
        let outcome = EvaluationOutcome::ScriptError(ScriptError {
            message: "boom".to_string(),
            stack: vec!["at f (<document>:2:3)".to_string(), "at <program> (<document>:4:1)".to_string()],
        });

        // Act
        let status = outcome.status();

        // Assert
        assert_eq!(status, "boom\nat f (<document>:2:3)\nat <program> (<document>:4:1)");
    }

    #[test]
    fn test_validation_error_status_lists_details() {
        let outcome = EvaluationOutcome::ValidationError(ValidationError {
            details: vec!["first".to_string(), "second".to_string()],
        });
        assert_eq!(outcome.status(), "Validation failed\nfirst\nsecond");
    }

    #[test]
    fn test_transport_error_status() {
        let outcome = EvaluationOutcome::TransportError("broken pipe".to_string());
        assert_eq!(outcome.status(), "Problem sending\nbroken pipe");
        assert!(!outcome.is_ok());
    }
}
