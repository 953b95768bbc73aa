//! livegraph-bridge library crate.
//!
//! Keeps a running rendering engine in sync with a graph script while it is
//! being edited: every quiet moment after an edit, the script is evaluated,
//! validated, and the resulting graph is streamed to the engine over TCP.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! editor / file on disk
//!         ↓  text + activity
//! [livegraph-bridge]
//!   ├── domain/            BridgeConfig and its defaults
//!   ├── application/
//!   │     ├── session          start / run / end / clear-cache
//!   │     ├── update_controller  debounced update cycle
//!   │     ├── pipeline         evaluate → validate → send → status
//!   │     └── script_runner    sandboxed evaluation (livegraph-core)
//!   └── infrastructure/
//!         ├── channel      reconnecting TCP link to the engine
//!         ├── document     where the script text comes from
//!         ├── watcher      file-system activity (notify)
//!         ├── status       where status blocks go
//!         └── storage/     config.toml
//!         ↓  newline-framed graph JSON
//! rendering engine
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` talks to the outside world only through the
//!   `GraphSink`, `DocumentSource`, and `StatusSurface` traits.
//! - `infrastructure` owns sockets, files, and the console.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: update cycles, the result pipeline, and commands.
pub mod application;

/// Infrastructure layer: engine connection, documents, watcher, status, storage.
pub mod infrastructure;
