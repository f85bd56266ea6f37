//! Typed views over frame payloads.
//!
//! Inbound frames are turned into [`ServerMessage`] values; outbound
//! requests are built from [`ClientRequest`]. Only the messages the
//! session and night layers act on get a typed variant. Everything else
//! (login, lobby, chat, votes) stays a [`ServerMessage::Passthrough`] for
//! the embedding application to handle.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};

use crate::types::flag;
use crate::{
    Codec, Frame, MessageType, Payload, PlayerEntry, ProtocolError, Role,
    RoomId,
};

// ---------------------------------------------------------------------------
// Role actions
// ---------------------------------------------------------------------------

/// The three night actions a participant can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SeerCheck,
    GuardProtect,
    WolfKill,
}

impl ActionKind {
    /// Frame type used to submit this action.
    pub fn request_type(self) -> MessageType {
        match self {
            Self::SeerCheck => MessageType::SeerCheckReq,
            Self::GuardProtect => MessageType::GuardProtectReq,
            Self::WolfKill => MessageType::WolfKillReq,
        }
    }

    /// Frame type the server answers this action with.
    pub fn result_type(self) -> MessageType {
        match self {
            Self::SeerCheck => MessageType::SeerResult,
            Self::GuardProtect => MessageType::GuardProtectRes,
            Self::WolfKill => MessageType::WolfKillRes,
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client payloads
// ---------------------------------------------------------------------------

/// Duration and/or absolute deadline announced for one sub-phase.
///
/// When both are present the absolute deadline wins: it is what the
/// server itself enforces.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTiming {
    /// Length of the sub-phase in seconds.
    pub duration: Option<f64>,
    /// Epoch seconds at which the sub-phase ends.
    pub deadline: Option<f64>,
}

/// `PHASE_NIGHT` (303): the night starts with the seer sub-phase.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NightBegin {
    pub room_id: Option<RoomId>,
    /// Total night budget in seconds.
    pub duration: Option<f64>,
    pub seer_duration: Option<f64>,
    pub guard_duration: Option<f64>,
    pub wolf_duration: Option<f64>,
    pub seer_deadline: Option<f64>,
    pub guard_deadline: Option<f64>,
    pub wolf_deadline: Option<f64>,
    #[serde(default, alias = "roster")]
    pub players: Vec<PlayerEntry>,
}

impl NightBegin {
    /// Timing of the seer sub-phase, which starts with this signal.
    pub fn seer_timing(&self) -> PhaseTiming {
        PhaseTiming {
            duration: self.seer_duration,
            deadline: self.seer_deadline,
        }
    }
}

#[derive(Deserialize)]
struct GuardStartBody {
    #[serde(alias = "duration")]
    guard_duration: Option<f64>,
    #[serde(alias = "deadline")]
    guard_deadline: Option<f64>,
}

#[derive(Deserialize)]
struct WolfStartBody {
    #[serde(alias = "duration")]
    wolf_duration: Option<f64>,
    #[serde(alias = "deadline")]
    wolf_deadline: Option<f64>,
}

/// `GAME_START_RES_AND_ROLE` (302): the local player's secret role.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoleAssignment {
    pub status: Option<String>,
    pub role: Option<Role>,
    pub role_name: Option<String>,
    pub role_description: Option<String>,
    /// Fellow werewolves; only sent to werewolves.
    #[serde(default, deserialize_with = "usernames")]
    pub werewolf_team: Vec<String>,
    pub message: Option<String>,
}

impl RoleAssignment {
    /// `true` unless the server explicitly reported a failure.
    pub fn is_success(&self) -> bool {
        self.status.as_deref() != Some("fail")
    }
}

/// `PHASE_DAY` (304): outcome of the night.
///
/// Two incompatible payload shapes exist in the wild. They are decoded as
/// a tagged union instead of guessing one canonical form; anything that
/// fits neither is kept verbatim.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NightResolution {
    /// `{"dead_players": ["ann", ...]}`
    Legacy { dead_players: Vec<String> },
    /// `{"result": "killed", "targetId": "ann"}`
    Compact {
        result: String,
        #[serde(
            rename = "targetId",
            alias = "target_id",
            default,
            deserialize_with = "optional_name"
        )]
        target_id: Option<String>,
    },
    Unrecognized(Map<String, Value>),
}

impl NightResolution {
    /// Usernames eliminated during the night.
    pub fn eliminated(&self) -> Vec<String> {
        match self {
            Self::Legacy { dead_players } => dead_players.clone(),
            Self::Compact { result, target_id } => {
                let killed = matches!(
                    result.as_str(),
                    "killed" | "kill" | "dead" | "eliminated"
                );
                match target_id {
                    Some(t) if killed => vec![t.clone()],
                    _ => Vec::new(),
                }
            }
            Self::Unrecognized(_) => Vec::new(),
        }
    }
}

/// `SEER_RESULT` (406).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeerResult {
    pub target_username: String,
    #[serde(deserialize_with = "flag")]
    pub is_werewolf: bool,
}

/// `WOLF_KILL_RES` (404) / `GUARD_PROTECT_RES` (408).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionAck {
    pub status: Option<String>,
    pub message: Option<String>,
}

impl ActionAck {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

/// Where a room stood when a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPhase {
    /// Game not started yet.
    Lobby,
    /// Roles dealt, players still reading their role card.
    RoleReveal,
    NightBegin,
    Seer,
    Guard,
    Wolf,
    /// Daytime: no night sub-phase is active.
    Day,
}

/// Server-side absolute deadlines (epoch seconds) carried by a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct SnapshotDeadlines {
    #[serde(alias = "seer_deadline")]
    pub seer: Option<f64>,
    #[serde(alias = "guard_deadline")]
    pub guard: Option<f64>,
    #[serde(alias = "wolf_deadline")]
    pub wolf: Option<f64>,
}

/// `GET_ROOM_INFO_RES` (211): authoritative room + phase state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomSnapshot {
    /// The server has sent this as both a string and a number, so it is
    /// kept loosely typed.
    pub status: Option<Value>,
    pub room_id: Option<RoomId>,
    pub phase: Option<SnapshotPhase>,
    pub role: Option<Role>,
    #[serde(default)]
    pub players: Vec<PlayerEntry>,
    #[serde(default, deserialize_with = "usernames")]
    pub werewolf_team: Vec<String>,
    #[serde(default)]
    pub deadlines: SnapshotDeadlines,
    pub message: Option<String>,
}

impl RoomSnapshot {
    pub fn is_failure(&self) -> bool {
        self.status.as_ref().and_then(Value::as_str) == Some("fail")
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Accepts `["ann", ...]` as well as `[{"username": "ann"}, ...]`.
fn usernames<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Name {
        Plain(String),
        Entry { username: String },
    }

    let names = Vec::<Name>::deserialize(deserializer)?;
    Ok(names
        .into_iter()
        .map(|n| match n {
            Name::Plain(s) | Name::Entry { username: s } => s,
        })
        .collect())
}

/// Accepts a string or a number and yields it as a string.
fn optional_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// An inbound frame, decoded into the shape its consumer needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The server asks "are you there?" and expects a pong back.
    Probe,
    /// Answer to a probe this client sent.
    ProbeAnswer,
    RoleAssigned(RoleAssignment),
    NightBegin(NightBegin),
    GuardStart(PhaseTiming),
    WolfStart(PhaseTiming),
    NightResolved(NightResolution),
    GameOver(Payload),
    SeerResult(SeerResult),
    ActionAck { kind: ActionKind, ack: ActionAck },
    RoomSnapshot(RoomSnapshot),
    ServerError { message: String },
    /// A frame the core doesn't own, or one whose payload failed to parse.
    /// The body is kept as a map when possible and raw bytes otherwise.
    Passthrough {
        msg_type: MessageType,
        payload: Payload,
    },
}

impl ServerMessage {
    /// Decodes a frame, falling back to [`ServerMessage::Passthrough`] with
    /// the raw body when the payload is malformed. Never fails, so one bad
    /// frame cannot abort the stream.
    pub fn from_frame<C: Codec>(frame: &Frame, codec: &C) -> Self {
        match Self::try_from_frame(frame, codec) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(
                    msg_type = %frame.msg_type,
                    error = %e,
                    "malformed payload, passing raw body through"
                );
                Self::Passthrough {
                    msg_type: frame.msg_type,
                    payload: Payload::parse(&frame.payload),
                }
            }
        }
    }

    /// Strict decode of a frame.
    ///
    /// # Errors
    /// [`ProtocolError::Malformed`] if the payload doesn't match the shape
    /// its message type requires.
    pub fn try_from_frame<C: Codec>(
        frame: &Frame,
        codec: &C,
    ) -> Result<Self, ProtocolError> {
        let ty = frame.msg_type;
        let body = frame.payload.as_slice();

        let msg = match ty {
            MessageType::Ping => {
                // The server answers a client probe with a 501 frame whose
                // body says "pong". Treat that as an answer, not a new probe.
                let payload = Payload::parse(body);
                if payload.get("type").and_then(Value::as_str) == Some("pong") {
                    Self::ProbeAnswer
                } else {
                    Self::Probe
                }
            }
            MessageType::Pong => Self::ProbeAnswer,
            MessageType::GameStartAndRole => {
                Self::RoleAssigned(codec.decode(ty, body)?)
            }
            MessageType::PhaseNight => Self::NightBegin(codec.decode(ty, body)?),
            MessageType::PhaseGuardStart => {
                let b: GuardStartBody = codec.decode(ty, body)?;
                Self::GuardStart(PhaseTiming {
                    duration: b.guard_duration,
                    deadline: b.guard_deadline,
                })
            }
            MessageType::PhaseWolfStart => {
                let b: WolfStartBody = codec.decode(ty, body)?;
                Self::WolfStart(PhaseTiming {
                    duration: b.wolf_duration,
                    deadline: b.wolf_deadline,
                })
            }
            MessageType::PhaseDay => Self::NightResolved(codec.decode(ty, body)?),
            MessageType::GameOver => Self::GameOver(Payload::parse(body)),
            MessageType::SeerResult => Self::SeerResult(codec.decode(ty, body)?),
            MessageType::WolfKillRes => Self::ActionAck {
                kind: ActionKind::WolfKill,
                ack: codec.decode(ty, body)?,
            },
            MessageType::GuardProtectRes => Self::ActionAck {
                kind: ActionKind::GuardProtect,
                ack: codec.decode(ty, body)?,
            },
            MessageType::RoomInfoRes => Self::RoomSnapshot(codec.decode(ty, body)?),
            MessageType::ErrorMsg => {
                let b: ErrorBody = codec.decode(ty, body)?;
                Self::ServerError {
                    message: b.message.unwrap_or_else(|| "unknown error".into()),
                }
            }
            other => Self::Passthrough {
                msg_type: other,
                payload: Payload::parse(body),
            },
        };
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// ClientRequest
// ---------------------------------------------------------------------------

/// Requests the core itself sends. Application-level requests (login,
/// chat, votes) are sent by the embedding application as raw frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Client-initiated liveness probe.
    Probe,
    /// Reply to a server probe.
    ProbeReply,
    /// Submit (or, with `target: None`, explicitly skip) a night action.
    RoleAction {
        kind: ActionKind,
        room_id: RoomId,
        target: Option<String>,
    },
    /// Done reading the role card.
    RoleCardDone { room_id: RoomId },
    /// Ask for an authoritative snapshot, used to resume after reconnect.
    RoomSnapshot { room_id: RoomId },
}

impl ClientRequest {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Probe => MessageType::Ping,
            Self::ProbeReply => MessageType::Pong,
            Self::RoleAction { kind, .. } => kind.request_type(),
            Self::RoleCardDone { .. } => MessageType::RoleCardDoneReq,
            Self::RoomSnapshot { .. } => MessageType::RoomInfoReq,
        }
    }

    /// Serializes the request body.
    pub fn encode_body<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        let body = match self {
            Self::Probe => json!({ "type": "ping" }),
            Self::ProbeReply => json!({ "type": "pong" }),
            Self::RoleAction {
                room_id,
                target: Some(target),
                ..
            } => json!({ "room_id": room_id, "target_username": target }),
            Self::RoleAction {
                room_id,
                target: None,
                ..
            } => json!({ "room_id": room_id, "target_username": null, "skip": true }),
            Self::RoleCardDone { room_id } | Self::RoomSnapshot { room_id } => {
                json!({ "room_id": room_id })
            }
        };
        codec.encode(&body)
    }

    /// Builds the complete frame for this request.
    pub fn to_frame<C: Codec>(&self, codec: &C) -> Result<Frame, ProtocolError> {
        Ok(Frame::new(self.message_type(), self.encode_body(codec)?))
    }
}
