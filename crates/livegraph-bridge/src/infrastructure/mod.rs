//! Infrastructure layer for livegraph-bridge.
//!
//! # Responsibilities
//!
//! - Holding the TCP connection to the engine and reconnecting when it drops
//! - Reading the script from disk or memory
//! - Turning file-system events into editor activity
//! - Printing or recording status blocks
//! - Loading and saving `config.toml`

pub mod channel;
pub mod document;
pub mod status;
pub mod storage;
pub mod watcher;

pub use channel::{ChannelConfig, ChannelState, ReconnectingChannel};
pub use document::{DocumentError, DocumentSource, FileDocument, MemoryDocument};
pub use status::{ConsoleStatus, RecordingStatus, StatusSurface};
pub use watcher::FileWatcher;
