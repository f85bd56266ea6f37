//! Codec trait and implementation for frame payload bodies.
//!
//! A frame body is structured text. The framing layer doesn't care how it
//! is serialized; it only needs something that implements [`Codec`]. The
//! server speaks JSON, so [`JsonCodec`] is the one implementation, but the
//! trait keeps message code independent of the concrete format.

use serde::{Serialize, de::DeserializeOwned};

use crate::{MessageType, ProtocolError};

/// Converts payload bodies between Rust types and bytes.
///
/// ## Trait bounds
///
/// - `Send + Sync + 'static` → a codec can live inside a client that is
///   moved onto a Tokio task.
///
/// `decode` takes the [`MessageType`] of the frame so that a failure can be
/// reported as [`ProtocolError::Malformed`] with the offending type.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a payload body.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a payload body of the given frame type.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Malformed`] if the bytes are not valid
    /// structured text or don't match the expected shape.
    fn decode<T: DeserializeOwned>(
        &self,
        msg_type: MessageType,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ## Example
///
/// ```rust
/// use nightwatch_protocol::{Codec, JsonCodec, MessageType, RoomSnapshot};
///
/// let codec = JsonCodec;
/// let bytes = br#"{"status":"success","room_id":4,"phase":"wolf"}"#;
/// let snapshot: RoomSnapshot = codec.decode(MessageType::RoomInfoRes, bytes).unwrap();
/// assert_eq!(snapshot.room_id.map(|r| r.0), Some(4));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        msg_type: MessageType,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        let malformed = |e: serde_json::Error| ProtocolError::Malformed {
            msg_type,
            reason: e.to_string(),
        };

        // An empty body is how the server says "no fields".
        let data: &[u8] = if data.is_empty() { b"{}" } else { data };

        // Parse to a `Value` first: the server occasionally emits the same
        // key twice, and a map keeps the last one where a struct would
        // reject the duplicate outright.
        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(malformed)?;
        serde_json::from_value(value).map_err(malformed)
    }
}
