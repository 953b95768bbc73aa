//! Bridge configuration types.
//!
//! [`BridgeConfig`] holds every runtime setting the bridge reads.  It is
//! built once, at bridge construction, from the persisted TOML file with CLI
//! and environment overrides applied on top; nothing re-reads configuration
//! while a session is live.

use std::time::Duration;

/// Default engine host.
pub const DEFAULT_ENGINE_HOST: &str = "127.0.0.1";

/// Default engine TCP port.
pub const DEFAULT_ENGINE_PORT: u16 = 9980;

/// Default delay between reconnection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Default upper bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default quiet period before an update cycle runs.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// All runtime configuration for one bridge.
///
/// # Example
///
/// ```rust
/// use livegraph_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.engine_port, 9980);
/// assert_eq!(cfg.engine_addr(), "127.0.0.1:9980");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Host name or IP address of the rendering engine.
    pub engine_host: String,

    /// TCP port the engine listens on.
    pub engine_port: u16,

    /// How long the channel waits after a disconnect before trying again.
    pub retry_interval: Duration,

    /// How long a single connection attempt may take before it counts as
    /// failed.
    pub connect_timeout: Duration,

    /// Editor activity must stop for this long before an update cycle runs.
    pub debounce_window: Duration,
}

impl BridgeConfig {
    /// `host:port` form of the engine address, for logging and connecting.
    pub fn engine_addr(&self) -> String {
        format!("{}:{}", self.engine_host, self.engine_port)
    }
}

impl Default for BridgeConfig {
    /// | Field           | Default       |
    /// |-----------------|---------------|
    /// | engine_host     | `127.0.0.1`   |
    /// | engine_port     | `9980`        |
    /// | retry_interval  | 1000 ms       |
    /// | connect_timeout | 1000 ms       |
    /// | debounce_window | 200 ms        |
    fn default() -> Self {
        Self {
            engine_host: DEFAULT_ENGINE_HOST.to_string(),
            engine_port: DEFAULT_ENGINE_PORT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
