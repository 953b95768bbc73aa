//! TOML settings for the bridge.
//!
//! Default location:
//! - Linux:    `$XDG_CONFIG_HOME/livegraph/config.toml` (or `~/.config/livegraph/`)
//! - macOS:    `~/Library/Application Support/LiveGraph/config.toml`
//! - Windows:  `%APPDATA%\LiveGraph\config.toml`
//!
//! # File format (for beginners)
//!
//! ```toml
//! [engine]
//! host = "127.0.0.1"
//! port = 9980
//!
//! [bridge]
//! debounce_ms = 200
//! retry_ms = 1000
//! connect_timeout_ms = 1000
//! log_level = "info"
//! ```
//!
//! Every key is optional.  A missing key takes its default through
//! `#[serde(default = "...")]`, and a missing file means "all defaults", so
//! the bridge runs out of the box.  Command-line flags override whatever the
//! file says (see `main.rs`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    BridgeConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DEBOUNCE_WINDOW, DEFAULT_ENGINE_HOST,
    DEFAULT_ENGINE_PORT, DEFAULT_RETRY_INTERVAL,
};

/// Name of the settings file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither an explicit path nor a platform config directory is available.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Everything stored in `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub bridge: BridgeSection,
}

/// Where the rendering engine listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Timing and logging for the bridge itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// Quiet window before a cycle runs, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Delay between reconnect attempts, in milliseconds.
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    DEFAULT_ENGINE_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_ENGINE_PORT
}
fn default_debounce_ms() -> u64 {
    millis(DEFAULT_DEBOUNCE_WINDOW)
}
fn default_retry_ms() -> u64 {
    millis(DEFAULT_RETRY_INTERVAL)
}
fn default_connect_timeout_ms() -> u64 {
    millis(DEFAULT_CONNECT_TIMEOUT)
}
fn default_log_level() -> String {
    "info".to_string()
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            retry_ms: default_retry_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// The runtime configuration these settings describe.
    pub fn to_bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            engine_host: self.engine.host.clone(),
            engine_port: self.engine.port,
            retry_interval: Duration::from_millis(self.bridge.retry_ms),
            connect_timeout: Duration::from_millis(self.bridge.connect_timeout_ms),
            debounce_window: Duration::from_millis(self.bridge.debounce_ms),
        }
    }
}

impl From<&BridgeConfig> for AppConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            engine: EngineSection {
                host: config.engine_host.clone(),
                port: config.engine_port,
            },
            bridge: BridgeSection {
                debounce_ms: millis(config.debounce_window),
                retry_ms: millis(config.retry_interval),
                connect_timeout_ms: millis(config.connect_timeout),
                log_level: default_log_level(),
            },
        }
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

/// The platform config directory for LiveGraph.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the environment does not
/// say where that is.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads settings from the platform location; defaults if there is no file.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads settings from `path`; defaults if there is no file.
///
/// # Errors
///
/// [`ConfigError::Io`] for read failures other than "not found",
/// [`ConfigError::Parse`] for malformed TOML.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LiveGraph"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("livegraph"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LiveGraph")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("livegraph_cfg_{}", Uuid::new_v4()))
            .join(CONFIG_FILE_NAME)
    }

    #[test]
    fn test_defaults_match_bridge_defaults() {
        // Arrange / Act
        let cfg = AppConfig::default().to_bridge_config();

        // Assert
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("empty TOML is valid");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.bridge.log_level, "info");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let text = r#"
[engine]
port = 7000

[bridge]
debounce_ms = 50
"#;

        // Act
        let cfg: AppConfig = toml::from_str(text).expect("deserialize partial");
        let bridge = cfg.to_bridge_config();

        // Assert
        assert_eq!(bridge.engine_addr(), "127.0.0.1:7000");
        assert_eq!(bridge.debounce_window, Duration::from_millis(50));
        assert_eq!(bridge.retry_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = load_config_from(&scratch_path()).expect("missing file is not an error");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        // Arrange
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[[[ not toml").unwrap();

        // Act
        let err = load_config_from(&path).unwrap_err();

        // Assert
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_save_then_load_via_temp_dir() {
        // Arrange
        let path = scratch_path();
        let mut cfg = AppConfig::default();
        cfg.engine.host = "render-box.local".to_string();
        cfg.bridge.retry_ms = 250;

        // Act
        save_config_to(&path, &cfg).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_from_bridge_config_carries_timings() {
        let bridge = BridgeConfig {
            debounce_window: Duration::from_millis(75),
            ..BridgeConfig::default()
        };
        let cfg = AppConfig::from(&bridge);
        assert_eq!(cfg.bridge.debounce_ms, 75);
        assert_eq!(cfg.to_bridge_config(), bridge);
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        // A stripped environment may have no config dir; that is acceptable.
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
