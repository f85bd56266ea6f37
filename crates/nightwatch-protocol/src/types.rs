//! Core protocol types: the frame type registry and the shared payload
//! building blocks (rooms, roles, roster entries).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// MessageType: the closed registry
// ---------------------------------------------------------------------------

/// Every frame type code the server and client agree on.
///
/// The numeric ranges group related messages:
/// - 100–199: authentication
/// - 200–299: room management
/// - 300–399: game flow (role reveal, phase signals)
/// - 400–499: in-game actions and their results
/// - 500+: system (errors, liveness)
///
/// A frame whose code is not listed here is rejected by the decoder with
/// [`ProtocolError::UnknownType`](crate::ProtocolError::UnknownType).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    LoginReq = 101,
    LoginRes = 102,
    RegisterReq = 103,
    RegisterRes = 104,
    LogoutReq = 105,
    LogoutRes = 106,

    GetRoomsReq = 201,
    GetRoomsRes = 202,
    CreateRoomReq = 203,
    CreateRoomRes = 204,
    JoinRoomReq = 205,
    JoinRoomRes = 206,
    RoomStatusUpdate = 207,
    LeaveRoomReq = 208,
    LeaveRoomRes = 209,
    /// Client → server: authoritative room + phase snapshot request.
    RoomInfoReq = 210,
    /// Server → client: room + phase snapshot, used to resume.
    RoomInfoRes = 211,

    StartGameReq = 301,
    /// Server → client: game started, here is your role.
    GameStartAndRole = 302,
    /// Server → client: night begins (seer sub-phase starts).
    PhaseNight = 303,
    /// Server → client: night resolved, day begins.
    PhaseDay = 304,
    GameOver = 305,
    RoleCardDoneReq = 310,
    /// Server → client: advance to the guard sub-phase.
    PhaseGuardStart = 311,
    /// Server → client: advance to the wolf sub-phase.
    PhaseWolfStart = 312,

    ChatReq = 401,
    ChatBroadcast = 402,
    WolfKillReq = 403,
    WolfKillRes = 404,
    SeerCheckReq = 405,
    SeerResult = 406,
    GuardProtectReq = 407,
    GuardProtectRes = 408,
    VoteReq = 409,
    VoteStatusUpdate = 410,
    VoteResult = 411,

    ErrorMsg = 500,
    /// Liveness probe (either direction).
    Ping = 501,
    /// Liveness response.
    Pong = 502,
}

impl MessageType {
    /// The numeric code written on the wire.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Looks up a wire code in the registry.
    pub fn from_code(code: u16) -> Option<Self> {
        use MessageType::*;
        let ty = match code {
            101 => LoginReq,
            102 => LoginRes,
            103 => RegisterReq,
            104 => RegisterRes,
            105 => LogoutReq,
            106 => LogoutRes,
            201 => GetRoomsReq,
            202 => GetRoomsRes,
            203 => CreateRoomReq,
            204 => CreateRoomRes,
            205 => JoinRoomReq,
            206 => JoinRoomRes,
            207 => RoomStatusUpdate,
            208 => LeaveRoomReq,
            209 => LeaveRoomRes,
            210 => RoomInfoReq,
            211 => RoomInfoRes,
            301 => StartGameReq,
            302 => GameStartAndRole,
            303 => PhaseNight,
            304 => PhaseDay,
            305 => GameOver,
            310 => RoleCardDoneReq,
            311 => PhaseGuardStart,
            312 => PhaseWolfStart,
            401 => ChatReq,
            402 => ChatBroadcast,
            403 => WolfKillReq,
            404 => WolfKillRes,
            405 => SeerCheckReq,
            406 => SeerResult,
            407 => GuardProtectReq,
            408 => GuardProtectRes,
            409 => VoteReq,
            410 => VoteStatusUpdate,
            411 => VoteResult,
            500 => ErrorMsg,
            501 => Ping,
            502 => Pong,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A room on the game server.
///
/// Newtype over the server's integer id so it can't be mixed up with
/// other integers in function signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u32);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// The secret role dealt to a player at game start.
///
/// On the wire this is an integer: 0 villager, 1 werewolf, 2 seer, 3 guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Role {
    Villager,
    Werewolf,
    Seer,
    Guard,
}

impl TryFrom<u8> for Role {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Villager),
            1 => Ok(Self::Werewolf),
            2 => Ok(Self::Seer),
            3 => Ok(Self::Guard),
            other => Err(format!("unknown role code {other}")),
        }
    }
}

impl From<Role> for u8 {
    fn from(role: Role) -> Self {
        match role {
            Role::Villager => 0,
            Role::Werewolf => 1,
            Role::Seer => 2,
            Role::Guard => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Villager => "Villager",
            Self::Werewolf => "Werewolf",
            Self::Seer => "Seer",
            Self::Guard => "Guard",
        };
        f.write_str(name)
    }
}

/// One entry of the roster snapshot the server sends with phase signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub username: String,
    /// The server sends `is_alive` as `0`/`1`; older payloads use a bool.
    #[serde(
        rename = "is_alive",
        alias = "alive",
        default = "default_alive",
        deserialize_with = "flag"
    )]
    pub alive: bool,
}

impl PlayerEntry {
    /// A living player with the given name.
    pub fn alive(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            alive: true,
        }
    }
}

fn default_alive() -> bool {
    true
}

/// Accepts `true`/`false` as well as integer flags.
pub(crate) fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

// ---------------------------------------------------------------------------
// Payload: parsed frame body with raw fallback
// ---------------------------------------------------------------------------

/// A frame body after a best-effort parse.
///
/// The protocol promises a JSON object (key/value map). If a frame carries
/// anything else, the bytes are kept verbatim in [`Payload::Raw`] so the
/// frame can still be routed and one bad frame never aborts the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Map(Map<String, Value>),
    Raw(Vec<u8>),
}

impl Payload {
    /// Parses `bytes` as a JSON object, falling back to [`Payload::Raw`].
    ///
    /// An empty body is treated as an empty map, matching the server,
    /// which sends `{}`-equivalent empty payloads for bodiless requests.
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Map(Map::new());
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Self::Map(map),
            Ok(_) | Err(_) => Self::Raw(bytes.to_vec()),
        }
    }

    /// Looks up a top-level key. Always `None` for raw payloads.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(key),
            Self::Raw(_) => None,
        }
    }

    /// Returns `true` if parsing fell back to raw bytes.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}
