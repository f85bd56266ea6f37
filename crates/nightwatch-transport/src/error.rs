use std::time::Duration;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An operation needed a live connection and there was none.
    #[error("not connected")]
    NotConnected,

    /// `reconnect` was called before any endpoint was ever connected.
    #[error("no endpoint to reconnect to")]
    NoEndpoint,

    /// The server refused the connection (or the address didn't resolve).
    #[error("connect to {endpoint} refused: {source}")]
    Refused {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The connection attempt didn't complete in time.
    #[error("connect to {endpoint} timed out after {after:?}")]
    ConnectTimeout { endpoint: String, after: Duration },

    /// Writing a frame failed. The connection is torn down.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The connection was closed by the peer or by a fatal stream error.
    #[error("connection closed: {0}")]
    Closed(String),

    /// Encoding an outbound frame failed.
    #[error(transparent)]
    Protocol(#[from] nightwatch_protocol::ProtocolError),
}

impl TransportError {
    /// Connect-time failures: the `ConnectError` family.
    pub fn is_connect_error(&self) -> bool {
        matches!(self, Self::Refused { .. } | Self::ConnectTimeout { .. })
    }
}
