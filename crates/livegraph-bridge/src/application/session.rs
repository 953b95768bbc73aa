//! The user-facing commands: start, run, end, clear-cache.
//!
//! # Session lifecycle (for beginners)
//!
//! A *bridge* is the pair (channel to the engine, update controller with its
//! previous-text snapshot).  At most one bridge is alive per [`Session`].
//!
//! | Command       | Effect                                                        |
//! |---------------|---------------------------------------------------------------|
//! | `start`       | create the bridge if needed, then react to editor activity    |
//! | `run`         | create the bridge if needed, stop reacting, run one cycle now |
//! | `end`         | dispose the bridge; activity is ignored until the next start  |
//! | `clear`       | forget every module loaded through `require`                  |
//!
//! Starting twice reuses the live bridge and its connection.  After `end`,
//! the next `start` or `run` builds a fresh bridge with an empty snapshot.
//! The module cache belongs to the session, so it survives `end`.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use livegraph_core::ModuleCache;

use super::pipeline::ResultPipeline;
use super::script_runner::ScriptRunner;
use super::update_controller::UpdateController;
use crate::domain::config::BridgeConfig;
use crate::infrastructure::channel::{ChannelConfig, ReconnectingChannel};
use crate::infrastructure::document::DocumentSource;
use crate::infrastructure::status::StatusSurface;

/// A command line typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Run,
    End,
    ClearCache,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "run" => Ok(Command::Run),
            "end" => Ok(Command::End),
            "clear" | "clearrequire" => Ok(Command::ClearCache),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!(
                "unknown command '{other}' (expected start, run, end, clear, or quit)"
            )),
        }
    }
}

#[derive(Clone)]
struct Bridge {
    session_id: Uuid,
    channel: Arc<ReconnectingChannel>,
    controller: Arc<UpdateController>,
    live: Arc<AtomicBool>,
}

impl Bridge {
    fn dispose(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.controller.cancel_pending();
        self.channel.dispose();
    }
}

/// Owns the current bridge and the module cache.
pub struct Session {
    config: BridgeConfig,
    document: Arc<dyn DocumentSource>,
    status: Arc<dyn StatusSurface>,
    cache: Arc<ModuleCache>,
    bridge: Mutex<Option<Bridge>>,
}

impl Session {
    pub fn new(
        config: BridgeConfig,
        document: Arc<dyn DocumentSource>,
        status: Arc<dyn StatusSurface>,
    ) -> Self {
        Self {
            config,
            document,
            status,
            cache: Arc::new(ModuleCache::new()),
            bridge: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Creates the bridge and starts connecting, without turning live updates
    /// on or off.  Returns the session id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(&self) -> Uuid {
        self.ensure_bridge().session_id
    }

    /// Starts reacting to editor activity.  Returns the session id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Uuid {
        let bridge = self.ensure_bridge();
        if !bridge.live.swap(true, Ordering::SeqCst) {
            info!(session = %bridge.session_id, "live updates on");
        }
        bridge.session_id
    }

    /// Stops live updates and runs one cycle immediately.
    pub async fn run(&self) -> String {
        let bridge = self.ensure_bridge();
        if bridge.live.swap(false, Ordering::SeqCst) {
            info!(session = %bridge.session_id, "live updates off");
        }
        bridge.controller.cancel_pending();
        bridge.controller.update().await
    }

    /// Disposes the bridge.  Returns whether there was one.
    pub fn end(&self) -> bool {
        let Some(bridge) = self.lock_bridge().take() else {
            return false;
        };
        bridge.dispose();
        info!(session = %bridge.session_id, "session ended");
        true
    }

    /// Forgets every cached module.  Returns how many were dropped.
    pub fn clear_cache(&self) -> usize {
        let dropped = self.cache.clear();
        info!(dropped, "module cache cleared");
        dropped
    }

    /// Signals editor activity.  Ignored unless live updates are on.
    pub fn on_editor_activity(&self) {
        let Some(bridge) = self.current() else {
            return;
        };
        if bridge.live.load(Ordering::SeqCst) {
            bridge.controller.on_editor_activity();
        } else {
            debug!("activity ignored; live updates off");
        }
    }

    pub fn is_live(&self) -> bool {
        self.current()
            .is_some_and(|bridge| bridge.live.load(Ordering::SeqCst))
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.current().map(|bridge| bridge.session_id)
    }

    pub fn is_connected(&self) -> bool {
        self.current()
            .is_some_and(|bridge| bridge.channel.is_connected())
    }

    /// Waits up to `timeout` for the bridge's channel to connect.  Returns
    /// `false` immediately when there is no bridge.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        match self.current() {
            Some(bridge) => bridge.channel.wait_connected(timeout).await,
            None => false,
        }
    }

    /// Applies `command`.  Returns the status text to show, if any.
    pub async fn execute(&self, command: Command) -> Option<String> {
        match command {
            Command::Start => {
                let id = self.start();
                Some(format!("Live updates on (session {id})"))
            }
            Command::Run => Some(self.run().await),
            Command::End => Some(if self.end() {
                "Session ended".to_string()
            } else {
                "No session".to_string()
            }),
            Command::ClearCache => {
                let dropped = self.clear_cache();
                Some(format!("Cleared {dropped} cached module(s)"))
            }
            Command::Quit => {
                self.end();
                None
            }
        }
    }

    fn lock_bridge(&self) -> std::sync::MutexGuard<'_, Option<Bridge>> {
        self.bridge.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<Bridge> {
        self.lock_bridge().clone()
    }

    fn ensure_bridge(&self) -> Bridge {
        let mut slot = self.lock_bridge();
        if let Some(bridge) = slot.as_ref() {
            return bridge.clone();
        }

        let session_id = Uuid::new_v4();
        let channel = Arc::new(ReconnectingChannel::new(ChannelConfig::from(&self.config)));
        channel.connect();

        let runner = ScriptRunner::with_cache(self.document.base_dir(), Arc::clone(&self.cache));
        let pipeline = ResultPipeline::new(runner, channel.clone());
        let controller = Arc::new(UpdateController::new(
            Arc::clone(&self.document),
            pipeline,
            Arc::clone(&self.status),
            self.config.debounce_window,
        ));

        let bridge = Bridge {
            session_id,
            channel,
            controller,
            live: Arc::new(AtomicBool::new(false)),
        };
        info!(
            session = %session_id,
            engine = %self.config.engine_addr(),
            "session started"
        );
        *slot = Some(bridge.clone());
        bridge
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
