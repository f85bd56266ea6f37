//! Error types for the protocol layer.

use crate::MessageType;

/// Errors that can occur while framing or parsing protocol data.
///
/// Only [`Truncated`](Self::Truncated) and
/// [`FrameTooLarge`](Self::FrameTooLarge) are fatal to a stream. The others
/// describe a single bad frame; callers log them and keep reading.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The peer closed the stream in the middle of a frame.
    #[error("stream closed mid-frame with {buffered} bytes buffered")]
    Truncated { buffered: usize },

    /// The payload is not the structured text its message type requires.
    #[error("malformed {msg_type} payload: {reason}")]
    Malformed {
        msg_type: MessageType,
        reason: String,
    },

    /// The frame's type code is not in the registry. The frame's bytes
    /// have already been consumed when this is returned.
    #[error("unknown message type {0}")]
    UnknownType(u16),

    /// The declared payload length is above the configured limit. The
    /// stream cannot be resynchronised after this.
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Serializing an outbound payload failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Returns `true` if the stream must be torn down after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::FrameTooLarge { .. })
    }
}
