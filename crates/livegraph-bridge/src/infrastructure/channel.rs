//! The persistent, self-healing TCP channel to the rendering engine.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!            connect()
//!   Disconnected ──────► Connecting ──ok──► Connected
//!        ▲                   │                  │
//!        │   retry interval  │ refused/timeout  │ EOF, read error,
//!        └───────────────────┴──────────────────┘ or failed write
//! ```
//!
//! A background *supervisor* task owns the loop above.  It keeps trying to
//! reach the engine every `retry_interval` until the channel is disposed.
//! Callers never wait for a connection: [`ReconnectingChannel::send`] on a
//! disconnected channel returns `Ok(())` and the payload is dropped.  The
//! next successful update cycle after reconnection carries the full,
//! current graph, so nothing needs to be queued.
//!
//! # Failure handling
//!
//! If writing to a live connection fails, or does not finish within
//! `write_timeout` because the engine stopped reading, `send` returns
//! [`TransportError::Write`], drops the connection, and wakes the
//! supervisor, which marks the channel disconnected and schedules a
//! reconnect.
//!
//! # Observing state
//!
//! [`ReconnectingChannel::state`] returns the current state,
//! [`ReconnectingChannel::subscribe`] delivers every transition in order, and
//! [`ReconnectingChannel::wait_connected`] waits for the next `Connected`.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use livegraph_core::encode_frame;

use crate::application::pipeline::{GraphSink, TransportError};
use crate::domain::config::{
    BridgeConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_ENGINE_HOST, DEFAULT_ENGINE_PORT,
    DEFAULT_RETRY_INTERVAL,
};

/// Capacity of the state-transition broadcast.  Slow subscribers see
/// `Lagged` rather than blocking the supervisor.
const STATE_EVENT_CAPACITY: usize = 32;

/// How long one frame may take to reach the socket before the connection is
/// treated as broken.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Connection state of a [`ReconnectingChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Where and how persistently to connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl ChannelConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ENGINE_HOST.to_string(),
            port: DEFAULT_ENGINE_PORT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl From<&BridgeConfig> for ChannelConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            host: config.engine_host.clone(),
            port: config.engine_port,
            retry_interval: config.retry_interval,
            connect_timeout: config.connect_timeout,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// A live connection: the write half plus a signal the writer raises when
/// the connection turns out to be broken.
struct Link {
    writer: OwnedWriteHalf,
    lost: Arc<Notify>,
}

struct Shared {
    config: ChannelConfig,
    link: Mutex<Option<Link>>,
    state: watch::Sender<ChannelState>,
    events: broadcast::Sender<ChannelState>,
    disposed: AtomicBool,
}

impl Shared {
    fn set_state(&self, next: ChannelState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "channel state changed");
            // No subscribers is fine.
            let _ = self.events.send(next);
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// A TCP client that reconnects forever and never blocks its callers.
pub struct ReconnectingChannel {
    shared: Arc<Shared>,
    supervisor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectingChannel {
    /// Creates a channel in the `Disconnected` state.  Nothing happens on the
    /// network until [`connect`](Self::connect) is called.
    pub fn new(config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (events, _) = broadcast::channel(STATE_EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                link: Mutex::new(None),
                state,
                events,
                disposed: AtomicBool::new(false),
            }),
            supervisor: std::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Starts the supervisor task.  Calling it again while the supervisor is
    /// running, or after [`dispose`](Self::dispose), does nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        if self.shared.is_disposed() {
            return;
        }
        let mut supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.shared))));
    }

    /// Writes one framed payload if connected.
    ///
    /// Returns `Ok(())` without sending when the channel is not connected or
    /// has been disposed.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Frame`] if `payload` cannot be framed.
    /// - [`TransportError::Write`] if the write on a live connection fails or
    ///   times out; the channel then drops the connection and reconnects.
    pub async fn send(&self, payload: &str) -> Result<(), TransportError> {
        let frame = encode_frame(payload)?;

        let mut link = self.shared.link.lock().await;
        if self.shared.is_disposed() {
            link.take();
            debug!("channel disposed; dropping payload");
            return Ok(());
        }
        let Some(live) = link.as_mut() else {
            debug!(bytes = frame.len(), "engine not connected; dropping payload");
            return Ok(());
        };

        let limit = self.shared.config.write_timeout;
        let written = match time::timeout(limit, live.writer.write_all(&frame)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("engine did not accept {} bytes within {limit:?}", frame.len()),
            )),
        };

        // dispose() could not take the link while this write held the lock.
        if self.shared.is_disposed() {
            link.take();
            debug!("channel disposed during send; connection closed");
            return Ok(());
        }

        match written {
            Ok(()) => {
                debug!(bytes = frame.len(), "graph sent to engine");
                Ok(())
            }
            Err(e) => {
                warn!("write to engine failed: {e}");
                if let Some(broken) = link.take() {
                    broken.lost.notify_one();
                }
                Err(TransportError::Write(e))
            }
        }
    }

    /// Stops reconnecting and closes any live connection.  Idempotent.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        // A send in progress holds the lock; it drops the link itself once
        // it sees the disposed flag.
        if let Ok(mut link) = self.shared.link.try_lock() {
            link.take();
        }
        self.shared.set_state(ChannelState::Disconnected);
        info!(engine = %self.shared.config.addr(), "channel disposed");
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Every state transition from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelState> {
        self.shared.events.subscribe()
    }

    /// Waits up to `timeout` for the channel to be connected.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.subscribe();
        let reached = time::timeout(timeout, state.wait_for(|s| *s == ChannelState::Connected)).await;
        reached.is_ok_and(|r| r.is_ok())
    }
}

impl Drop for ReconnectingChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[async_trait]
impl GraphSink for ReconnectingChannel {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        ReconnectingChannel::send(self, payload).await
    }
}

/// The supervisor loop: connect, hold the connection until it breaks, wait,
/// repeat.
async fn supervise(shared: Arc<Shared>) {
    let addr = shared.config.addr();
    let retry = shared.config.retry_interval;

    while !shared.is_disposed() {
        shared.set_state(ChannelState::Connecting);

        match time::timeout(shared.config.connect_timeout, TcpStream::connect(addr.as_str())).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("could not set TCP_NODELAY: {e}");
                }
                let (reader, writer) = stream.into_split();
                let lost = Arc::new(Notify::new());
                {
                    let mut link = shared.link.lock().await;
                    if shared.is_disposed() {
                        break;
                    }
                    *link = Some(Link {
                        writer,
                        lost: Arc::clone(&lost),
                    });
                }
                shared.set_state(ChannelState::Connected);
                info!(engine = %addr, "connected to engine");

                let reason = tokio::select! {
                    reason = drain(reader) => reason,
                    _ = lost.notified() => "write failed".to_string(),
                };

                shared.link.lock().await.take();
                shared.set_state(ChannelState::Disconnected);
                info!(engine = %addr, %reason, "disconnected from engine; retrying in {retry:?}");
            }
            Ok(Err(e)) => {
                shared.set_state(ChannelState::Disconnected);
                warn!(engine = %addr, "could not connect to engine: {e}");
            }
            Err(_) => {
                shared.set_state(ChannelState::Disconnected);
                warn!(engine = %addr, "connection attempt timed out after {:?}", shared.config.connect_timeout);
            }
        }

        if shared.is_disposed() {
            break;
        }
        time::sleep(retry).await;
    }
}

/// Reads and discards whatever the engine sends until the connection ends.
/// Returns why it ended.
async fn drain(mut reader: OwnedReadHalf) -> String {
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return "closed by engine".to_string(),
            Ok(n) => debug!(bytes = n, "ignoring bytes from engine"),
            Err(e) => return format!("read error: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
