//! Length-prefixed framing.
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! [type: u16 BE][length: u32 BE][payload: length bytes]
//! ```
//!
//! The length does **not** include the 6 header bytes. Reads from a
//! non-blocking socket can stop anywhere inside a frame, so decoding is
//! split in two: [`decode`] inspects a byte slice and reports either a
//! complete frame or how much is still missing, and [`FrameDecoder`] owns
//! the buffer that accumulates partial deliveries between reads.

use crate::{MessageType, ProtocolError};

/// Size of the fixed frame header (type + length).
pub const HEADER_LEN: usize = 6;

/// Default upper bound on a single payload. A room snapshot with a full
/// roster is a few KiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// One complete unit of the wire protocol.
///
/// The wire `length` field is not stored: it is always
/// `payload.len()`, which is what [`encode`] writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame from a type and payload bytes.
    pub fn new(msg_type: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// The value of the wire `length` field for this frame.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the frame has no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encodes this frame to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self.msg_type, &self.payload)
    }
}

/// Outcome of inspecting a byte slice for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A full frame was found at the start of the slice.
    /// `consumed` is header + payload length.
    Complete { frame: Frame, consumed: usize },
    /// Not enough bytes yet. `needed` is the total number of bytes the
    /// slice must hold before the frame can complete (a lower bound while
    /// the header itself is still partial).
    Incomplete { needed: usize },
}

/// Encodes a frame: 2-byte big-endian type, 4-byte big-endian length,
/// then the payload.
///
/// # Errors
/// [`ProtocolError::FrameTooLarge`] if the payload does not fit in a `u32`.
pub fn encode(
    msg_type: MessageType,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: u32::MAX as usize,
        }
    })?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&msg_type.code().to_be_bytes());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Inspects the start of `bytes` for one frame.
///
/// Never blocks and never consumes anything: the caller advances its own
/// buffer by `consumed` on [`Decoded::Complete`].
///
/// # Errors
/// - [`ProtocolError::FrameTooLarge`] if the declared length exceeds
///   `max_payload`.
/// - [`ProtocolError::UnknownType`] if the full frame is present but its
///   type code is not in the registry. The frame length is still valid, so
///   [`FrameDecoder`] skips those bytes and carries on.
pub fn decode(bytes: &[u8], max_payload: usize) -> Result<Decoded, ProtocolError> {
    if bytes.len() < HEADER_LEN {
        return Ok(Decoded::Incomplete { needed: HEADER_LEN });
    }

    let code = u16::from_be_bytes([bytes[0], bytes[1]]);
    let len = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;

    if len > max_payload {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: max_payload,
        });
    }

    let total = HEADER_LEN + len;
    if bytes.len() < total {
        return Ok(Decoded::Incomplete { needed: total });
    }

    let msg_type =
        MessageType::from_code(code).ok_or(ProtocolError::UnknownType(code))?;

    Ok(Decoded::Complete {
        frame: Frame::new(msg_type, &bytes[HEADER_LEN..total]),
        consumed: total,
    })
}

/// Accumulates partial reads and yields complete frames in arrival order.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_payload: usize,
}

impl FrameDecoder {
    /// Creates a decoder that rejects payloads above `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_payload,
        }
    }

    /// Appends bytes just read from the socket.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete frame, if one is fully buffered.
    ///
    /// Returns `Ok(None)` when the buffer holds only part of a frame; the
    /// partial bytes stay buffered for the next call.
    ///
    /// An unknown type code is reported once as an error after its bytes
    /// are dropped, so calling again continues with the following frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        match decode(&self.buf, self.max_payload) {
            Ok(Decoded::Complete { frame, consumed }) => {
                self.buf.drain(..consumed);
                Ok(Some(frame))
            }
            Ok(Decoded::Incomplete { .. }) => Ok(None),
            Err(ProtocolError::UnknownType(code)) => {
                // Header is complete here, so the length field is readable.
                let len = u32::from_be_bytes([
                    self.buf[2],
                    self.buf[3],
                    self.buf[4],
                    self.buf[5],
                ]) as usize;
                self.buf.drain(..HEADER_LEN + len);
                Err(ProtocolError::UnknownType(code))
            }
            Err(e) => Err(e),
        }
    }

    /// Call when the peer has closed the stream.
    ///
    /// # Errors
    /// [`ProtocolError::Truncated`] if a partial frame is still buffered.
    pub fn finish(&mut self) -> Result<(), ProtocolError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            let buffered = self.buf.len();
            self.buf.clear();
            Err(ProtocolError::Truncated { buffered })
        }
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drops any buffered bytes. Used when a connection is replaced.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}
