//! Error types for the session layer.

/// Failures in keeping the connection alive.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Nothing arrived from the server for longer than the liveness timeout.
    #[error("no traffic from server for {silent_for:.1}s")]
    LivenessTimeout { silent_for: f64 },

    /// Every reconnect attempt failed. Fatal to the session: the user has
    /// to start over from the entry screen.
    #[error("could not reconnect after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// A reconnect attempt is already being dialled.
    #[error("a reconnect attempt is already in progress")]
    ReconnectInProgress,

    /// Reconnect requested before any server address was known.
    #[error("no server address to reconnect to")]
    NoEndpoint,
}
