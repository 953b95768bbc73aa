//! Storage infrastructure: the persisted settings file.
//!
//! `config` reads `config.toml` from the platform config directory (or an
//! explicit path given on the command line), falls back to defaults when the
//! file or any key is missing, and writes the file for `livegraph
//! init-config`.

pub mod config;
