//! File-system activity for the watched script.
//!
//! The parent directory is watched rather than the file itself, because most
//! editors save by writing a temporary file and renaming it over the
//! original, which would orphan a watch on the old inode.  Events are then
//! filtered down to the one file name.  Each surviving event becomes one
//! unit of editor activity; bursts are collapsed later by the debouncer.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Queue depth between the notify thread and the async side.  Activity is
/// coalesced anyway, so a full queue just drops the extra signal.
const ACTIVITY_QUEUE: usize = 16;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("{0} does not name a file")]
    NotAFile(PathBuf),

    #[error("could not watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Delivers one `()` per relevant change to the watched file.
pub struct FileWatcher {
    // Dropping the watcher stops the notify thread.
    _watcher: RecommendedWatcher,
    activity: mpsc::Receiver<()>,
}

impl FileWatcher {
    /// Starts watching `file`.
    pub fn new(file: &Path) -> Result<Self, WatchError> {
        let name = file
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| WatchError::NotAFile(file.to_path_buf()))?;
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, activity) = mpsc::channel(ACTIVITY_QUEUE);
        let target = name.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_activity(&event, &target) {
                    // A full queue already holds a pending signal.
                    let _ = tx.try_send(());
                }
            }
            Err(e) => error!("file watch error: {e}"),
        })
        .map_err(|source| WatchError::Notify {
            path: dir.clone(),
            source,
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: dir.clone(),
                source,
            })?;
        debug!(dir = %dir.display(), file = ?name, "watching for changes");

        Ok(Self {
            _watcher: watcher,
            activity,
        })
    }

    /// Waits for the next change.  Returns `None` once the watcher has shut
    /// down.
    pub async fn next(&mut self) -> Option<()> {
        self.activity.recv().await
    }
}

/// Whether `event` is a content or metadata change to the file named `name`.
pub fn is_activity(event: &Event, name: &OsString) -> bool {
    if event.kind.is_access() || event.kind.is_other() {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(name.as_os_str()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use notify::EventKind;

    fn name() -> OsString {
        OsString::from("patch.lg")
    }

    #[test]
    fn test_modify_of_watched_file_is_activity() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/w/patch.lg"));
        assert!(is_activity(&event, &name()));
    }

    #[test]
    fn test_rename_over_watched_file_is_activity() {
        // Arrange: editors that save atomically create the file anew.
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/w/.patch.lg.swp"))
            .add_path(PathBuf::from("/w/patch.lg"));

        // Act / Assert
        assert!(is_activity(&event, &name()));
    }

    #[test]
    fn test_other_files_are_ignored() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/w/other.lg"));
        assert!(!is_activity(&event, &name()));
    }

    #[test]
    fn test_access_events_are_ignored() {
        let event = Event::new(EventKind::Access(AccessKind::Any)).add_path(PathBuf::from("/w/patch.lg"));
        assert!(!is_activity(&event, &name()));
    }

    #[test]
    fn test_path_without_file_name_is_rejected() {
        let err = FileWatcher::new(Path::new("/")).err().unwrap();
        assert!(matches!(err, WatchError::NotAFile(_)));
    }
}
