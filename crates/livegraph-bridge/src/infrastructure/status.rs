//! The status surface: a plain, append-only text sink that is cleared at the
//! start of every update cycle.

use std::sync::{Mutex, PoisonError};

/// Receives the status block of each cycle.
pub trait StatusSurface: Send + Sync {
    /// Removes everything shown by the previous cycle.
    fn clear(&self);

    /// Appends one block of text (which may span several lines).
    fn append_line(&self, text: &str);
}

/// Prints status blocks to standard output, separated by a rule.
#[derive(Debug, Default)]
pub struct ConsoleStatus;

impl StatusSurface for ConsoleStatus {
    fn clear(&self) {
        println!("──────── livegraph ────────");
    }

    fn append_line(&self, text: &str) {
        println!("{text}");
    }
}

/// Keeps every status block in memory.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    lines: Mutex<Vec<String>>,
    clears: Mutex<usize>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks appended since the last clear.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The most recent block, if any.
    pub fn last_status(&self) -> Option<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn clear_count(&self) -> usize {
        *self.clears.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusSurface for RecordingStatus {
    fn clear(&self) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clear();
        *self.clears.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn append_line(&self, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_drops_previous_lines() {
        // Arrange
        let status = RecordingStatus::new();
        status.append_line("Correct");

        // Act
        status.clear();
        status.append_line("Problem sending\nbroken pipe");

        // Assert
        assert_eq!(status.lines(), vec!["Problem sending\nbroken pipe".to_string()]);
        assert_eq!(status.clear_count(), 1);
    }

    #[test]
    fn test_last_status_on_fresh_surface_is_none() {
        assert_eq!(RecordingStatus::new().last_status(), None);
    }
}
