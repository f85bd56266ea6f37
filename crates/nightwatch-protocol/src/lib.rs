//! Wire protocol for Nightwatch.
//!
//! This crate defines the "language" the client and the game server speak:
//!
//! - **Frames** ([`Frame`], [`FrameDecoder`]): the length-prefixed unit
//!   that travels over TCP.
//! - **Registry** ([`MessageType`]): the closed set of frame type codes.
//! - **Messages** ([`ServerMessage`], [`ClientRequest`]): typed views over
//!   the UTF-8 JSON payload carried by each frame.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how payload bodies are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while framing or
//!   parsing.
//!
//! # Wire format
//!
//! ```text
//! +------------------+--------------------+----------------------+
//! | type (2 bytes)   | length (4 bytes)   | payload              |
//! | u16 big-endian   | u32 big-endian     | `length` bytes, JSON |
//! +------------------+--------------------+----------------------+
//! ```
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Frame → ServerMessage) → Session / Night
//! ```

mod codec;
mod error;
mod frame;
mod messages;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use frame::{
    DEFAULT_MAX_FRAME_LEN, Decoded, Frame, FrameDecoder, HEADER_LEN, decode,
    encode,
};
pub use messages::{
    ActionAck, ActionKind, ClientRequest, NightBegin, NightResolution,
    PhaseTiming, RoleAssignment, RoomSnapshot, SeerResult, ServerMessage,
    SnapshotDeadlines, SnapshotPhase,
};
pub use types::{MessageType, Payload, PlayerEntry, Role, RoomId};
