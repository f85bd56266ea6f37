//! Unified error type for the Nightwatch client.

use nightwatch_night::StateError;
use nightwatch_protocol::ProtocolError;
use nightwatch_session::SessionError;
use nightwatch_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum NightwatchError {
    /// Connection, send, or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode or decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Liveness loss or reconnect failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A night signal or request the state machine refused.
    #[error(transparent)]
    State(#[from] StateError),

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl NightwatchError {
    /// `true` if the session is over and the user has to start again
    /// from the entry screen.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Session(SessionError::ReconnectExhausted { .. })
        )
    }
}
