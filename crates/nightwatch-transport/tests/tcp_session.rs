//! Integration tests for the TCP transport session.
//!
//! These spin up a real `TcpListener` on an OS-assigned port and play the
//! server side by hand, writing raw frame bytes, so the session is
//! exercised against genuine partial reads and peer closes.

#[cfg(feature = "tcp")]
mod tcp {
    use std::time::Duration;

    use nightwatch_protocol::{Frame, MessageType, encode};
    use nightwatch_transport::{
        ConnectionState, Endpoint, TcpConnector, TransportError, TransportSession,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Binds a listener and connects a session to it.
    async fn connected_pair() -> (TransportSession<TcpConnector>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
        let port = listener.local_addr().unwrap().port();

        let mut session = TransportSession::new(TcpConnector::default());
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        session
            .connect(Endpoint::new("127.0.0.1", port))
            .await
            .expect("should connect");
        let server = accept.await.expect("accept task");
        (session, server)
    }

    /// Polls until `want` frames have arrived or a second has passed.
    async fn poll_frames(
        session: &mut TransportSession<TcpConnector>,
        want: usize,
    ) -> Vec<Frame> {
        let mut frames = Vec::new();
        for _ in 0..100 {
            frames.extend(session.poll_receive().expect("poll should succeed"));
            if frames.len() >= want {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        frames
    }

    #[tokio::test]
    async fn test_connect_sets_connected_state() {
        let (session, _server) = connected_pair().await;
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.endpoint().unwrap().host, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_connect_refused_leaves_disconnected() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let mut session = TransportSession::new(TcpConnector::default());
        let err = session
            .connect(Endpoint::new("127.0.0.1", port))
            .await
            .unwrap_err();
        assert!(err.is_connect_error(), "unexpected error: {err}");
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_writes_one_complete_frame() {
        let (mut session, mut server) = connected_pair().await;
        session
            .send(MessageType::Pong, br#"{"type":"pong"}"#)
            .await
            .expect("send should succeed");

        let expected = encode(MessageType::Pong, br#"{"type":"pong"}"#).unwrap();
        let mut got = vec![0u8; expected.len()];
        server.read_exact(&mut got).await.unwrap();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_send_without_connection_is_not_connected() {
        let mut session = TransportSession::new(TcpConnector::default());
        let err = session.send(MessageType::Ping, b"{}").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_poll_receive_drains_a_burst_in_one_call() {
        let (mut session, mut server) = connected_pair().await;

        let mut burst = Vec::new();
        for i in 0..20 {
            let body = format!(r#"{{"type":"player_joined","username":"p{i}"}}"#);
            burst.extend(encode(MessageType::RoomStatusUpdate, body.as_bytes()).unwrap());
        }
        server.write_all(&burst).await.unwrap();
        server.flush().await.unwrap();

        // Wait until everything is on our side of the socket, then make
        // sure a single poll hands back every frame.
        let mut frames = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            frames = session.poll_receive().unwrap();
            if !frames.is_empty() {
                break;
            }
        }
        let more = poll_frames(&mut session, 20 - frames.len()).await;
        frames.extend(more);
        assert_eq!(frames.len(), 20);
        assert!(frames.iter().all(|f| f.msg_type == MessageType::RoomStatusUpdate));
    }

    #[tokio::test]
    async fn test_poll_receive_reassembles_split_frame() {
        let (mut session, mut server) = connected_pair().await;
        let bytes = encode(MessageType::PhaseGuardStart, br#"{"guard_duration":30}"#).unwrap();

        server.write_all(&bytes[..4]).await.unwrap();
        server.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.poll_receive().unwrap().is_empty());

        server.write_all(&bytes[4..]).await.unwrap();
        server.flush().await.unwrap();
        let frames = poll_frames(&mut session, 1).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].msg_type, MessageType::PhaseGuardStart);
    }

    #[tokio::test]
    async fn test_poll_receive_reports_peer_close() {
        let (mut session, server) = connected_pair().await;
        drop(server);

        let mut result = Ok(Vec::new());
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            result = session.poll_receive();
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(TransportError::Closed(_))));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_frames_before_close_are_delivered_first() {
        let (mut session, mut server) = connected_pair().await;
        server
            .write_all(&encode(MessageType::Ping, b"{}").unwrap())
            .await
            .unwrap();
        server.flush().await.unwrap();
        drop(server);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut frames = Vec::new();
        let mut closed = false;
        for _ in 0..100 {
            match session.poll_receive() {
                Ok(f) => frames.extend(f),
                Err(TransportError::Closed(_)) => {
                    closed = true;
                    break;
                }
                Err(e) => panic!("unexpected error {e}"),
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(closed);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].msg_type, MessageType::Ping);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (mut session, _server) = connected_pair().await;
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(matches!(
            session.poll_receive(),
            Err(TransportError::NotConnected)
        ));
        session.destroy();
    }

    #[tokio::test]
    async fn test_reconnect_redials_last_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let first = listener.accept().await.unwrap().0;
            let second = listener.accept().await.unwrap().0;
            (first, second)
        });

        let mut session = TransportSession::new(TcpConnector::default());
        session.connect(Endpoint::new("127.0.0.1", port)).await.unwrap();
        session.disconnect();
        session.reconnect().await.expect("reconnect should succeed");
        assert!(session.is_connected());
        let _ = accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_without_endpoint_fails() {
        let mut session = TransportSession::new(TcpConnector::default());
        assert!(matches!(
            session.reconnect().await,
            Err(TransportError::NoEndpoint)
        ));
    }
}
