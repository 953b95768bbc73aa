//! Newline-delimited framing for graph payloads.
//!
//! Wire format:
//! ```text
//! [payload: UTF-8, no '\n'][0x0A]
//! ```
//!
//! Serialized graphs are compact JSON, which never contains a raw newline,
//! so a payload with an embedded `\n` is a caller bug and is rejected rather
//! than silently split into two frames.
//!
//! # Why a decoder?
//!
//! TCP is a stream protocol: one `read()` may return half a line or several
//! lines at once.  [`FrameDecoder`] buffers bytes across reads and yields each
//! complete line exactly once.  The engine side (and the test harnesses that
//! stand in for it) use it to read what the bridge sends.

use thiserror::Error;

/// Errors that can occur while framing or unframing a payload.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    /// The payload contains a newline, which would split it into two frames.
    #[error("payload contains a newline at byte {offset}")]
    EmbeddedNewline { offset: usize },

    /// A received line is not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Encodes `payload` as one newline-terminated frame.
///
/// # Errors
///
/// Returns [`FrameError::EmbeddedNewline`] if `payload` contains `\n`.
///
/// # Examples
///
/// ```rust
/// use livegraph_core::protocol::encode_frame;
///
/// let bytes = encode_frame("{}").unwrap();
/// assert_eq!(bytes, b"{}\n");
/// ```
pub fn encode_frame(payload: &str) -> Result<Vec<u8>, FrameError> {
    if let Some(offset) = payload.find('\n') {
        return Err(FrameError::EmbeddedNewline { offset });
    }
    let mut buf = Vec::with_capacity(payload.len() + 1);
    buf.extend_from_slice(payload.as_bytes());
    buf.push(b'\n');
    Ok(buf)
}

/// Incremental decoder for a stream of newline-terminated frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every frame completed by them, in order.
    ///
    /// A trailing `\r` is stripped so that CRLF-terminated peers also work.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, FrameError>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            frames.push(String::from_utf8(line).map_err(|e| FrameError::InvalidUtf8(e.to_string())));
        }
        frames
    }

    /// Number of buffered bytes that do not yet form a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
