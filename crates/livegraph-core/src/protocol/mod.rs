//! Wire protocol between the bridge and the rendering engine.
//!
//! The protocol is deliberately minimal: each successful update cycle sends
//! one UTF-8 line holding the serialized graph, terminated by `\n`.  There is
//! no handshake, no acknowledgement, and no length prefix.

pub mod frame;

pub use frame::{encode_frame, FrameDecoder, FrameError};
