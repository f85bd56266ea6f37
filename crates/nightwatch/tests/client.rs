//! Integration tests for the client loop against a scripted in-memory server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nightwatch::prelude::*;
use nightwatch::protocol::{Frame, FrameDecoder};
use nightwatch::tick::ManualClock;
use nightwatch::transport::{Connection, Connector, ReadOutcome, TransportError};
use nightwatch::NightwatchError;

// =========================================================================
// Scripted server
// =========================================================================

#[derive(Default)]
struct Wire {
    /// Server → client bytes not yet read.
    inbound: VecDeque<u8>,
    /// Client → server bytes.
    outbound: Vec<u8>,
    closed: bool,
}

#[derive(Default)]
struct Script {
    refusals: u32,
    dials: u32,
    wire: Option<Arc<Mutex<Wire>>>,
}

/// Both the connector handed to the client and the test's handle on the
/// server side.
#[derive(Clone, Default)]
struct Server {
    script: Arc<Mutex<Script>>,
}

impl Server {
    fn wire(&self) -> Arc<Mutex<Wire>> {
        self.script
            .lock()
            .unwrap()
            .wire
            .clone()
            .expect("no connection open")
    }

    fn push(&self, msg_type: MessageType, body: &str) {
        let bytes = nightwatch::protocol::encode(msg_type, body.as_bytes()).unwrap();
        self.wire().lock().unwrap().inbound.extend(bytes);
    }

    fn close(&self) {
        self.wire().lock().unwrap().closed = true;
    }

    fn refuse_next(&self, n: u32) {
        self.script.lock().unwrap().refusals = n;
    }

    fn dials(&self) -> u32 {
        self.script.lock().unwrap().dials
    }

    /// Frames the client wrote on the current connection.
    fn sent(&self) -> Vec<Frame> {
        let bytes = self.wire().lock().unwrap().outbound.clone();
        let mut decoder = FrameDecoder::default();
        decoder.extend(&bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    fn sent_of(&self, msg_type: MessageType) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|f| f.msg_type == msg_type)
            .map(|f| serde_json::from_slice(&f.payload).unwrap())
            .collect()
    }
}

struct ScriptedConnection {
    wire: Arc<Mutex<Wire>>,
}

impl Connection for ScriptedConnection {
    fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        let mut wire = self.wire.lock().unwrap();
        if wire.inbound.is_empty() {
            return Ok(if wire.closed {
                ReadOutcome::Closed
            } else {
                ReadOutcome::WouldBlock
            });
        }
        let n = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(ReadOutcome::Data(n))
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut wire = self.wire.lock().unwrap();
        if wire.closed {
            return Err(TransportError::SendFailed(std::io::ErrorKind::BrokenPipe.into()));
        }
        wire.outbound.extend_from_slice(data);
        Ok(())
    }
}

impl Connector for Server {
    type Connection = ScriptedConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<ScriptedConnection, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.dials += 1;
        if script.refusals > 0 {
            script.refusals -= 1;
            return Err(TransportError::Refused {
                endpoint: endpoint.to_string(),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            });
        }
        let wire = Arc::new(Mutex::new(Wire::default()));
        script.wire = Some(Arc::clone(&wire));
        Ok(ScriptedConnection { wire })
    }
}

// =========================================================================
// Recording presenter
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Phase(NightState, RoleView),
    Tick(Phase, f64),
    Conn(ConnectionState),
    Prompt,
    Restored,
    Entry(String),
    Note(String),
    Role(Option<Role>),
    Action(ActionOutcome),
    Resolved(Vec<String>),
    GameOver,
}

#[derive(Default)]
struct Recorder {
    seen: Vec<Seen>,
    choice: ReconnectChoice,
}

impl Recorder {
    fn answering(choice: ReconnectChoice) -> Self {
        Self {
            seen: Vec::new(),
            choice,
        }
    }

    fn count(&self, pred: impl Fn(&Seen) -> bool) -> usize {
        self.seen.iter().filter(|s| pred(s)).count()
    }

    fn last_phase(&self) -> Option<&Seen> {
        self.seen.iter().rev().find(|s| matches!(s, Seen::Phase(..)))
    }
}

impl Presenter for Recorder {
    fn on_phase_changed(&mut self, state: NightState, view: &RoleView) {
        self.seen.push(Seen::Phase(state, view.clone()));
    }

    fn on_deadline_tick(&mut self, phase: Phase, remaining_secs: f64) {
        self.seen.push(Seen::Tick(phase, remaining_secs));
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        self.seen.push(Seen::Conn(state));
    }

    fn on_reconnect_prompt(&mut self, _reason: &NightwatchError) -> ReconnectChoice {
        self.seen.push(Seen::Prompt);
        self.choice
    }

    fn on_connection_restored(&mut self) {
        self.seen.push(Seen::Restored);
    }

    fn on_return_to_entry(&mut self, reason: &str) {
        self.seen.push(Seen::Entry(reason.to_string()));
    }

    fn on_notification(&mut self, message: &str) {
        self.seen.push(Seen::Note(message.to_string()));
    }

    fn on_role_revealed(&mut self, role: Option<Role>, _wolf_team: &[String]) {
        self.seen.push(Seen::Role(role));
    }

    fn on_action_result(&mut self, outcome: &ActionOutcome) {
        self.seen.push(Seen::Action(outcome.clone()));
    }

    fn on_night_resolved(&mut self, _resolution: &NightResolution, eliminated: &[String]) {
        self.seen.push(Seen::Resolved(eliminated.to_vec()));
    }

    fn on_game_over(&mut self, _result: &Payload) {
        self.seen.push(Seen::GameOver);
    }
}

// =========================================================================
// Helpers
// =========================================================================

type TestClient = Client<Server, Recorder, ManualClock>;

const NIGHT: &str = r#"{"duration":90,"seer_duration":30,"guard_duration":30,"wolf_duration":30,
    "roster":[{"username":"ann","is_alive":1},{"username":"bob","is_alive":1},
              {"username":"dan","is_alive":1}]}"#;

fn config() -> ClientConfig {
    ClientConfig {
        probe_interval: None,
        ..Default::default()
    }
}

async fn connected(
    user: &str,
    choice: ReconnectChoice,
    config: ClientConfig,
) -> (TestClient, Server, ManualClock) {
    let server = Server::default();
    let clock = ManualClock::new(1_000.0);
    let mut client = ClientBuilder::new()
        .config(config)
        .local_user(user)
        .build(server.clone(), Recorder::answering(choice), clock.clone());
    client.connect(Endpoint::new("game.test", 5000)).await.unwrap();
    (client, server, clock)
}

/// Joins room 12 and deals `role`.
async fn seated(user: &str, role: Role) -> (TestClient, Server, ManualClock) {
    let (mut client, server, clock) = connected(user, ReconnectChoice::Reconnect, config()).await;
    client.enter_room(RoomId(12));
    let code = u8::from(role);
    server.push(
        MessageType::GameStartAndRole,
        &format!(r#"{{"status":"success","role":{code},"werewolf_team":["dan"]}}"#),
    );
    client.tick().await.unwrap();
    (client, server, clock)
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_connect_reports_connecting_then_connected() {
    let (client, _server, clock) =
        connected("ann", ReconnectChoice::Undecided, config()).await;
    assert_eq!(
        client.presenter().seen,
        vec![
            Seen::Conn(ConnectionState::Connecting),
            Seen::Conn(ConnectionState::Connected)
        ]
    );
    assert_eq!(client.session_info().last_activity, Some(clock.now()));
}

#[tokio::test]
async fn test_night_begin_reaches_presenter_with_seer_view() {
    let (mut client, server, _clock) = seated("ann", Role::Seer).await;
    assert!(client.presenter().seen.contains(&Seen::Role(Some(Role::Seer))));

    server.push(MessageType::PhaseNight, NIGHT);
    client.tick().await.unwrap();

    match client.presenter().last_phase() {
        Some(Seen::Phase(NightState::Night(Phase::SeerPhase), view)) => {
            assert!(view.accepts_input());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(client.remaining(), Some(30.0));
    assert!(client.presenter().seen.contains(&Seen::Tick(Phase::SeerPhase, 30.0)));
}

#[tokio::test]
async fn test_duplicate_wolf_signal_enters_wolf_once() {
    let (mut client, server, clock) = seated("dan", Role::Werewolf).await;
    server.push(MessageType::PhaseNight, NIGHT);
    client.tick().await.unwrap();

    clock.advance(60.0);
    server.push(MessageType::PhaseWolfStart, r#"{"wolf_duration":30}"#);
    server.push(MessageType::PhaseWolfStart, r#"{"wolf_duration":30}"#);
    client.tick().await.unwrap();

    let wolf_entries = client
        .presenter()
        .count(|s| matches!(s, Seen::Phase(NightState::Night(Phase::WolfPhase), _)));
    assert_eq!(wolf_entries, 1);
    assert_eq!(client.remaining(), Some(30.0));
}

#[tokio::test]
async fn test_burst_is_drained_in_one_tick() {
    let (mut client, server, _clock) =
        connected("ann", ReconnectChoice::Undecided, config()).await;
    for i in 0..50 {
        server.push(
            MessageType::ChatBroadcast,
            &format!(r#"{{"username":"bob","message":"hi {i}"}}"#),
        );
    }
    client.tick().await.unwrap();

    let queued = client.drain_passthrough();
    assert_eq!(queued.len(), 50);
    assert!(queued.iter().all(|(ty, _)| *ty == MessageType::ChatBroadcast));
    assert_eq!(
        queued[49].1.get("message").and_then(|v| v.as_str()),
        Some("hi 49")
    );
    assert!(client.drain_passthrough().is_empty());
}

#[tokio::test]
async fn test_server_probe_is_answered() {
    let (mut client, server, _clock) =
        connected("ann", ReconnectChoice::Undecided, config()).await;
    server.push(MessageType::Ping, "");
    client.tick().await.unwrap();

    let replies = server.sent_of(MessageType::Pong);
    assert_eq!(replies, vec![serde_json::json!({"type": "pong"})]);
    assert!(client.drain_passthrough().is_empty());
}

#[tokio::test]
async fn test_client_probe_sent_on_interval() {
    let cfg = ClientConfig {
        probe_interval: Some(Duration::from_secs(25)),
        ..Default::default()
    };
    let (mut client, server, clock) = connected("ann", ReconnectChoice::Undecided, cfg).await;

    clock.advance(24.0);
    client.tick().await.unwrap();
    assert!(server.sent_of(MessageType::Ping).is_empty());

    clock.advance(1.0);
    client.tick().await.unwrap();
    assert_eq!(server.sent_of(MessageType::Ping).len(), 1);
}

#[tokio::test]
async fn test_server_error_becomes_notification() {
    let (mut client, server, _clock) =
        connected("ann", ReconnectChoice::Undecided, config()).await;
    server.push(MessageType::ErrorMsg, r#"{"message":"room is full"}"#);
    client.tick().await.unwrap();
    assert!(client.presenter().seen.contains(&Seen::Note("room is full".into())));
}

#[tokio::test]
async fn test_unsolicited_room_info_is_passed_through() {
    let (mut client, server, _clock) = seated("ann", Role::Seer).await;
    server.push(
        MessageType::RoomInfoRes,
        r#"{"status":"success","room_id":12,"phase":"wolf","role":2}"#,
    );
    client.tick().await.unwrap();

    assert_eq!(client.night().state(), NightState::RoleReveal);
    let queued = client.drain_passthrough();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].0, MessageType::RoomInfoRes);
}

// =========================================================================
// Actions
// =========================================================================

#[tokio::test]
async fn test_submit_action_sends_seer_check() {
    let (mut client, server, _clock) = seated("ann", Role::Seer).await;
    server.push(MessageType::PhaseNight, NIGHT);
    client.tick().await.unwrap();

    client.submit_action("bob").await.unwrap();
    assert_eq!(
        server.sent_of(MessageType::SeerCheckReq),
        vec![serde_json::json!({"room_id": 12, "target_username": "bob"})]
    );

    server.push(
        MessageType::SeerResult,
        r#"{"target_username":"bob","is_werewolf":false}"#,
    );
    client.tick().await.unwrap();
    assert!(client.presenter().seen.contains(&Seen::Action(ActionOutcome::SeerReveal {
        target: "bob".into(),
        is_werewolf: false,
    })));
}

#[tokio::test]
async fn test_submit_action_twice_is_rejected() {
    let (mut client, server, _clock) = seated("ann", Role::Seer).await;
    server.push(MessageType::PhaseNight, NIGHT);
    client.tick().await.unwrap();

    client.submit_action("bob").await.unwrap();
    let err = client.submit_action("dan").await.unwrap_err();
    assert!(matches!(err, NightwatchError::State(_)));
    assert_eq!(server.sent_of(MessageType::SeerCheckReq).len(), 1);
}

#[tokio::test]
async fn test_expired_deadline_sends_skip_once() {
    let (mut client, server, clock) = seated("ann", Role::Seer).await;
    server.push(MessageType::PhaseNight, NIGHT);
    client.tick().await.unwrap();

    clock.advance(31.0);
    client.tick().await.unwrap();
    clock.advance(1.0);
    client.tick().await.unwrap();

    assert_eq!(
        server.sent_of(MessageType::SeerCheckReq),
        vec![serde_json::json!({"room_id": 12, "target_username": null, "skip": true})]
    );
}

#[tokio::test]
async fn test_role_card_ack_sends_done() {
    let (mut client, server, _clock) = seated("bob", Role::Villager).await;
    client.acknowledge_role_card().await.unwrap();
    assert_eq!(
        server.sent_of(MessageType::RoleCardDoneReq),
        vec![serde_json::json!({"room_id": 12})]
    );
}

#[tokio::test]
async fn test_night_resolution_then_game_over() {
    let (mut client, server, _clock) = seated("ann", Role::Seer).await;
    server.push(MessageType::PhaseNight, NIGHT);
    server.push(MessageType::PhaseDay, r#"{"dead_players":["bob"]}"#);
    client.tick().await.unwrap();
    assert!(client.presenter().seen.contains(&Seen::Resolved(vec!["bob".into()])));
    assert_eq!(client.night().state(), NightState::Day);

    server.push(MessageType::GameOver, r#"{"winner":"villagers"}"#);
    client.tick().await.unwrap();
    assert!(client.presenter().seen.contains(&Seen::GameOver));
    assert_eq!(client.night().state(), NightState::Lobby);
    assert_eq!(client.night().room_id(), Some(RoomId(12)));
}

#[tokio::test]
async fn test_game_over_then_next_deal_plays_in_same_room() {
    let (mut client, server, _clock) = seated("ann", Role::Seer).await;
    server.push(MessageType::PhaseNight, NIGHT);
    server.push(MessageType::GameOver, r#"{"winner":"wolves"}"#);
    client.tick().await.unwrap();
    assert_eq!(client.night().state(), NightState::Lobby);

    let code = u8::from(Role::Seer);
    server.push(
        MessageType::GameStartAndRole,
        &format!(r#"{{"status":"success","role":{code},"werewolf_team":["dan"]}}"#),
    );
    server.push(MessageType::PhaseNight, NIGHT);
    client.tick().await.unwrap();

    assert_eq!(client.night().state(), NightState::Night(Phase::SeerPhase));
    assert_eq!(client.remaining(), Some(30.0));
    client.submit_action("bob").await.unwrap();
    assert_eq!(
        server.sent_of(MessageType::SeerCheckReq),
        vec![serde_json::json!({"room_id": 12, "target_username": "bob"})]
    );
}

// =========================================================================
// Loss and recovery
// =========================================================================

#[tokio::test]
async fn test_peer_close_prompts_once_and_backs_off() {
    let (mut client, server, clock) = seated("ann", Role::Seer).await;
    server.refuse_next(2);
    server.close();

    // Loss is seen, the user says yes, attempt 1 dials on the same tick.
    client.tick().await.unwrap();
    assert_eq!(client.presenter().count(|s| *s == Seen::Prompt), 1);
    assert_eq!(server.dials(), 2);

    // Attempt 2 waits 4 s.
    clock.advance(3.75);
    client.tick().await.unwrap();
    assert_eq!(server.dials(), 2);
    clock.advance(0.25);
    client.tick().await.unwrap();
    assert_eq!(server.dials(), 3);

    // Attempt 3 waits 8 s and succeeds.
    clock.advance(8.0);
    client.tick().await.unwrap();
    assert_eq!(server.dials(), 4);
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    for _ in 0..10 {
        clock.advance(5.0);
        client.tick().await.unwrap();
    }
    let p = client.presenter();
    assert_eq!(p.count(|s| *s == Seen::Restored), 1);
    assert_eq!(p.count(|s| *s == Seen::Prompt), 1);
    assert_eq!(server.dials(), 4);
}

#[tokio::test]
async fn test_reconnect_resumes_mid_wolf_with_server_deadline() {
    let (mut client, server, clock) = seated("dan", Role::Werewolf).await;
    server.push(MessageType::PhaseNight, NIGHT);
    client.tick().await.unwrap();
    server.close();
    client.tick().await.unwrap();

    // A fresh connection: the resume request went out on it.
    assert_eq!(
        server.sent_of(MessageType::RoomInfoReq),
        vec![serde_json::json!({"room_id": 12})]
    );

    let snapshot = format!(
        r#"{{"status":"success","room_id":12,"phase":"wolf","role":1,
            "players":[{{"username":"ann","is_alive":1}},{{"username":"dan","is_alive":1}}],
            "werewolf_team":["dan"],"deadlines":{{"wolf":{}}}}}"#,
        clock.now() + 12.0
    );
    server.push(MessageType::RoomInfoRes, &snapshot);
    client.tick().await.unwrap();

    assert_eq!(client.night().state(), NightState::Night(Phase::WolfPhase));
    let remaining = client.remaining().unwrap();
    assert!((remaining - 12.0).abs() < 1e-6, "remaining = {remaining}");
    assert!(client.night().current_view().accepts_input());
}

#[tokio::test]
async fn test_rejected_resume_is_notification() {
    let (mut client, server, _clock) = seated("ann", Role::Seer).await;
    server.close();
    client.tick().await.unwrap();
    server.push(
        MessageType::RoomInfoRes,
        r#"{"status":"fail","message":"room closed"}"#,
    );
    client.tick().await.unwrap();
    assert!(client
        .presenter()
        .seen
        .contains(&Seen::Note("could not resume: room closed".into())));
}

#[tokio::test]
async fn test_expiry_while_offline_or_resyncing_sends_no_skip() {
    let (mut client, server, clock) =
        connected("ann", ReconnectChoice::Undecided, config()).await;
    client.enter_room(RoomId(12));
    let code = u8::from(Role::Seer);
    server.push(
        MessageType::GameStartAndRole,
        &format!(r#"{{"status":"success","role":{code},"werewolf_team":["dan"]}}"#),
    );
    server.push(MessageType::PhaseNight, NIGHT);
    client.tick().await.unwrap();

    // The link drops and the seer deadline passes while nobody answers.
    server.close();
    client.tick().await.unwrap();
    clock.advance(31.0);
    client.tick().await.unwrap();
    assert!(client.night().current_view().accepts_input());

    // Back on a new link, but the room has not been re-synced yet.
    client.attempt_reconnect().await.unwrap();
    clock.advance(1.0);
    client.tick().await.unwrap();
    assert!(server.sent_of(MessageType::SeerCheckReq).is_empty());

    // The snapshot gives the seer five more seconds; expiry then skips once.
    let snapshot = format!(
        r#"{{"status":"success","room_id":12,"phase":"seer","role":{code},
            "players":[{{"username":"ann","is_alive":1}},{{"username":"bob","is_alive":1}}],
            "deadlines":{{"seer":{}}}}}"#,
        clock.now() + 5.0
    );
    server.push(MessageType::RoomInfoRes, &snapshot);
    client.tick().await.unwrap();
    assert!(server.sent_of(MessageType::SeerCheckReq).is_empty());

    clock.advance(6.0);
    client.tick().await.unwrap();
    assert_eq!(
        server.sent_of(MessageType::SeerCheckReq),
        vec![serde_json::json!({"room_id": 12, "target_username": null, "skip": true})]
    );
}

#[tokio::test]
async fn test_exhausted_reconnect_returns_to_entry() {
    let cfg = ClientConfig {
        max_reconnect_attempts: 2,
        ..config()
    };
    let (mut client, server, clock) = connected("ann", ReconnectChoice::Reconnect, cfg).await;
    client.enter_room(RoomId(3));
    server.refuse_next(10);
    server.close();

    client.tick().await.unwrap();
    clock.advance(4.0);
    let err = client.tick().await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(client.night().state(), NightState::Idle);
    let p = client.presenter();
    assert_eq!(p.count(|s| matches!(s, Seen::Entry(_))), 1);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    // Nothing left scheduled.
    clock.advance(60.0);
    client.tick().await.unwrap();
    assert_eq!(server.dials(), 3);
}

#[tokio::test]
async fn test_heartbeat_silence_declares_loss() {
    let cfg = ClientConfig {
        check_interval: Duration::from_secs(1),
        liveness_timeout: Duration::from_secs(15),
        ..config()
    };
    let (mut client, _server, clock) = connected("ann", ReconnectChoice::Undecided, cfg).await;

    for _ in 0..80 {
        clock.advance(0.25);
        client.tick().await.unwrap();
    }
    assert_eq!(client.presenter().count(|s| *s == Seen::Prompt), 1);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_give_up_cancels_retries() {
    let (mut client, server, clock) =
        connected("ann", ReconnectChoice::Undecided, config()).await;
    server.refuse_next(10);
    server.close();
    client.tick().await.unwrap();

    client.attempt_reconnect().await.unwrap();
    assert_eq!(server.dials(), 2);
    client.give_up();

    for _ in 0..20 {
        clock.advance(5.0);
        client.tick().await.unwrap();
    }
    assert_eq!(server.dials(), 2);
    assert!(client
        .presenter()
        .seen
        .contains(&Seen::Entry("reconnect cancelled".into())));
}

#[tokio::test]
async fn test_session_info_counts_attempts() {
    let (mut client, server, _clock) =
        connected("ann", ReconnectChoice::Undecided, config()).await;
    server.refuse_next(10);
    server.close();
    client.tick().await.unwrap();
    client.attempt_reconnect().await.unwrap();

    let info = client.session_info();
    assert_eq!(info.connection_state, ConnectionState::Disconnected);
    assert_eq!(info.reconnect_attempts, 1);
}
