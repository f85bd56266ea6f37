//! The transport session: sole owner of the server connection.
//!
//! No other component touches the socket. Heartbeat replies, night
//! actions, and application requests all funnel through
//! [`TransportSession::send`], which takes `&mut self`; the borrow checker
//! is the single-writer lock, so two frames can never interleave on the
//! wire.

use nightwatch_protocol::{
    DEFAULT_MAX_FRAME_LEN, Frame, FrameDecoder, MessageType, ProtocolError,
};

use crate::{
    Connection, ConnectionState, Connector, Endpoint, ReadOutcome,
    TransportError,
};

/// Bytes requested from the socket per read call.
const READ_CHUNK: usize = 8 * 1024;

/// Owns one (re)connectable framed connection to the game server.
pub struct TransportSession<C: Connector> {
    connector: C,
    conn: Option<C::Connection>,
    endpoint: Option<Endpoint>,
    state: ConnectionState,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    /// Set when the stream closed during a poll that still produced
    /// frames; reported by the next poll so those frames aren't lost.
    pending_close: Option<String>,
}

impl<C: Connector> TransportSession<C> {
    /// Creates a disconnected session.
    pub fn new(connector: C) -> Self {
        Self::with_max_frame_len(connector, DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a disconnected session with a custom payload size limit.
    pub fn with_max_frame_len(connector: C, max_frame_len: usize) -> Self {
        Self {
            connector,
            conn: None,
            endpoint: None,
            state: ConnectionState::Disconnected,
            decoder: FrameDecoder::new(max_frame_len),
            read_buf: vec![0; READ_CHUNK],
            pending_close: None,
        }
    }

    /// Connects to `endpoint`, replacing any existing connection.
    ///
    /// The endpoint is remembered for [`reconnect`](Self::reconnect) even
    /// when the attempt fails.
    ///
    /// # Errors
    /// [`TransportError::Refused`] or [`TransportError::ConnectTimeout`];
    /// the session is left `Disconnected`.
    pub async fn connect(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        self.disconnect();
        self.endpoint = Some(endpoint.clone());
        self.state = ConnectionState::Connecting;

        match self.connector.connect(&endpoint).await {
            Ok(conn) => {
                self.conn = Some(conn);
                self.state = ConnectionState::Connected;
                tracing::info!(%endpoint, "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                tracing::warn!(%endpoint, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Tears down the current connection and dials the last endpoint again.
    ///
    /// # Errors
    /// [`TransportError::NoEndpoint`] if `connect` was never called, or
    /// any error `connect` can return.
    pub async fn reconnect(&mut self) -> Result<(), TransportError> {
        let endpoint = self.endpoint.clone().ok_or(TransportError::NoEndpoint)?;
        self.connect(endpoint).await
    }

    /// Writes one frame.
    ///
    /// # Errors
    /// - [`TransportError::NotConnected`] if there is no live connection.
    /// - [`TransportError::SendFailed`] if the write fails; the connection
    ///   is dropped and the session becomes `Disconnected`.
    pub async fn send(
        &mut self,
        msg_type: MessageType,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::NotConnected)?;
        let bytes = nightwatch_protocol::encode(msg_type, payload)?;

        match conn.write_all(&bytes).await {
            Ok(()) => {
                tracing::trace!(%msg_type, len = payload.len(), "frame sent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%msg_type, error = %e, "send failed, dropping connection");
                self.teardown();
                Err(e)
            }
        }
    }

    /// Drains every complete frame currently available, without waiting.
    ///
    /// Reads until the socket reports it would block, then decodes every
    /// complete frame in the buffer, in arrival order. A trailing partial
    /// frame stays buffered for the next call.
    ///
    /// Frames with an unknown type code are skipped with a warning.
    ///
    /// # Errors
    /// - [`TransportError::NotConnected`] if there is no connection.
    /// - [`TransportError::Closed`] if the peer closed the stream (including
    ///   closing mid-frame) or the stream hit a fatal framing error. If the
    ///   same poll also produced frames, they are returned first and the
    ///   close is reported on the next call.
    pub fn poll_receive(&mut self) -> Result<Vec<Frame>, TransportError> {
        if let Some(reason) = self.pending_close.take() {
            return Err(TransportError::Closed(reason));
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        let mut closed: Option<String> = None;
        loop {
            match conn.try_read(&mut self.read_buf) {
                Ok(ReadOutcome::Data(n)) => self.decoder.extend(&self.read_buf[..n]),
                Ok(ReadOutcome::WouldBlock) => break,
                Ok(ReadOutcome::Closed) => {
                    closed = Some("closed by peer".to_string());
                    break;
                }
                Err(e) => {
                    closed = Some(e.to_string());
                    break;
                }
            }
        }

        let mut frames = Vec::new();
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(error = %e, "skipping undecodable frame");
                }
                Err(e) => {
                    tracing::error!(error = %e, "fatal framing error");
                    closed = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(mut reason) = closed {
            if let Err(e @ ProtocolError::Truncated { .. }) = self.decoder.finish() {
                tracing::warn!(error = %e, "stream ended mid-frame");
                reason = e.to_string();
            }
            self.teardown();
            if frames.is_empty() {
                return Err(TransportError::Closed(reason));
            }
            self.pending_close = Some(reason);
        }

        if !frames.is_empty() {
            tracing::trace!(count = frames.len(), "frames received");
        }
        Ok(frames)
    }

    /// Drops the connection. Idempotent and infallible.
    pub fn disconnect(&mut self) {
        if self.conn.is_some() {
            tracing::debug!(endpoint = ?self.endpoint, "disconnecting");
        }
        self.teardown();
        self.pending_close = None;
    }

    /// Drops the connection and consumes the session.
    pub fn destroy(mut self) {
        self.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The endpoint of the last `connect` call.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    fn teardown(&mut self) {
        self.conn = None;
        self.decoder.reset();
        self.state = ConnectionState::Disconnected;
    }
}

impl<C: Connector> Drop for TransportSession<C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
