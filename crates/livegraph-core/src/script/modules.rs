//! Module resolution for `require` and the cache behind it.
//!
//! # How `require` works (for beginners)
//!
//! `require("./lib/shapes")` resolves its argument against the directory of
//! the document being edited, normalises the result (`.` and `..` are folded
//! away without touching the file system), and runs that file as a separate
//! program.  The file's returned value becomes the value of the `require`
//! call.
//!
//! Running a helper file on every keystroke would be wasteful, so the value
//! is cached by resolved path in a [`ModuleCache`].  The cache outlives any
//! single evaluation: the bridge owns one and clears it when the user asks
//! to reload helper files.
//!
//! A file that requires itself (directly or through other files) is an
//! error rather than an infinite loop; the [`ModuleLoader`] tracks which
//! files are currently being loaded.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::value::Value;

/// Extension tried when a required path does not exist as written.
pub const SCRIPT_EXTENSION: &str = "lg";

/// Values exported by already-evaluated modules, keyed by resolved path.
#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: Mutex<HashMap<PathBuf, Value>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Value> {
        self.lock().get(path).cloned()
    }

    pub fn insert(&self, path: PathBuf, value: Value) {
        self.lock().insert(path, value);
    }

    /// Forgets every cached module.  Returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Value>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-evaluation module resolver.
///
/// Create one for each evaluation; it shares the long-lived cache and keeps
/// its own stack of in-progress loads for cycle detection.
#[derive(Debug)]
pub struct ModuleLoader {
    base_dir: PathBuf,
    cache: Arc<ModuleCache>,
    loading: RefCell<Vec<PathBuf>>,
}

impl ModuleLoader {
    pub fn new(base_dir: impl Into<PathBuf>, cache: Arc<ModuleCache>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache,
            loading: RefCell::new(Vec::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Resolves `request` against the base directory.
    ///
    /// When the path as written does not exist but the same path with the
    /// script extension does, the latter is used.
    pub fn resolve(&self, request: &str) -> PathBuf {
        let joined = normalize(&self.base_dir.join(request));
        if joined.extension().is_none() && !joined.exists() {
            let with_ext = joined.with_extension(SCRIPT_EXTENSION);
            if with_ext.exists() {
                return with_ext;
            }
        }
        joined
    }

    /// Marks `path` as being loaded.
    ///
    /// # Errors
    ///
    /// Returns the chain of files that leads back to `path` if it is already
    /// being loaded.
    pub fn begin(&self, path: &Path) -> Result<(), String> {
        let mut loading = self.loading.borrow_mut();
        if let Some(start) = loading.iter().position(|p| p == path) {
            let chain: Vec<String> = loading[start..]
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect();
            return Err(chain.join(" -> "));
        }
        debug!(path = %path.display(), "loading module");
        loading.push(path.to_path_buf());
        Ok(())
    }

    /// Pops `path` off the loading stack.
    pub fn finish(&self, path: &Path) {
        let mut loading = self.loading.borrow_mut();
        if let Some(pos) = loading.iter().rposition(|p| p == path) {
            loading.remove(pos);
        }
    }
}

/// Lexically folds `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
