//! TCP transport implementation using `tokio::net::TcpStream`.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::{Connection, Connector, Endpoint, ReadOutcome, TransportError};

/// A [`Connector`] that dials plain TCP with a connect timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    async fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Self::Connection, TransportError> {
        let dial = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let stream = match tokio::time::timeout(self.connect_timeout, dial).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::Refused {
                    endpoint: endpoint.to_string(),
                    source: e,
                });
            }
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    after: self.connect_timeout,
                });
            }
        };

        // Frames are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not disable Nagle");
        }
        let peer = stream.peer_addr().ok();
        tracing::debug!(%endpoint, ?peer, "tcp connection established");

        Ok(TcpConnection { stream, peer })
    }
}

/// A single TCP connection to the server.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpConnection {
    /// The remote address, if the OS reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Connection for TcpConnection {
    fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        match self.stream.try_read(buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(ReadOutcome::WouldBlock),
            Err(e) => Err(TransportError::Closed(e.to_string())),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        self.stream.flush().await.map_err(TransportError::SendFailed)
    }
}
