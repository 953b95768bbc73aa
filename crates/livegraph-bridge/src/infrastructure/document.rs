//! Where the script text comes from.
//!
//! [`FileDocument`] reads a script from disk on every cycle; the editor (or
//! anything else) saves the file and the watcher reports activity.
//! [`MemoryDocument`] holds the text in memory and is what tests and embedders
//! drive directly.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

/// Failure to read the current document text.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies the full current text of the edited document.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn read_text(&self) -> Result<String, DocumentError>;

    /// Directory that relative `require` paths resolve against.
    fn base_dir(&self) -> PathBuf;
}

/// A script file on disk.
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentSource for FileDocument {
    async fn read_text(&self) -> Result<String, DocumentError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DocumentError::Read {
                path: self.path.clone(),
                source,
            })
    }

    fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// An in-memory document.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    text: Mutex<String>,
    base_dir: PathBuf,
}

impl MemoryDocument {
    pub fn new(text: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            text: Mutex::new(text.into()),
            base_dir: base_dir.into(),
        }
    }

    /// Replaces the whole document text.
    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = text.into();
    }
}

#[async_trait]
impl DocumentSource for MemoryDocument {
    async fn read_text(&self) -> Result<String, DocumentError> {
        Ok(self.text.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn base_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
