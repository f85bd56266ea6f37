//! Transport layer for Nightwatch.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the byte stream to the game server, and [`TransportSession`], the single
//! owner of that stream. Every frame the client sends goes through
//! [`TransportSession::send`]; every frame it receives comes out of
//! [`TransportSession::poll_receive`].
//!
//! # Feature Flags
//!
//! - `tcp` (default): TCP transport via `tokio::net::TcpStream`

#![allow(async_fn_in_trait)]

mod error;
mod session;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
pub use session::TransportSession;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpConnector};

use std::fmt;

/// Where the game server lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection lifecycle as seen by the rest of the client.
///
/// ```text
///   Disconnected ──connect()──→ Connecting ──ok──→ Connected
///        ↑                          │                  │
///        └──────────err─────────────┘                  │
///        └──────────closed / disconnect()──────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Result of one non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were copied into the buffer.
    Data(usize),
    /// Nothing is available right now.
    WouldBlock,
    /// The peer closed the stream.
    Closed,
}

/// Opens connections to the game server.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a new connection.
    ///
    /// # Errors
    /// [`TransportError::Refused`] or [`TransportError::ConnectTimeout`].
    async fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Self::Connection, TransportError>;
}

/// An open byte stream to the server.
///
/// Dropping a connection closes it.
pub trait Connection: Send + 'static {
    /// Reads whatever is available without waiting.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError>;

    /// Writes all of `data`, in order, before returning.
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;
}
