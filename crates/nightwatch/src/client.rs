//! `Client` builder and the client loop.
//!
//! This is the entry point for embedding Nightwatch. It ties together all
//! the layers: transport → protocol → session → night, and routes every
//! decoded frame to exactly one owner.

use std::collections::VecDeque;
use std::future::Future;

use nightwatch_night::{NightController, NightEvent, StateError};
use nightwatch_protocol::{
    ClientRequest, Codec, Frame, JsonCodec, MessageType, Payload, RoomId,
    ServerMessage,
};
use nightwatch_session::{
    HeartbeatMonitor, ReconnectAttempt, ReconnectCoordinator, ReconnectOutcome,
    SessionError,
};
use nightwatch_tick::{Clock, SystemClock, TickScheduler};
use nightwatch_transport::{
    ConnectionState, Connector, Endpoint, TransportError, TransportSession,
};
use serde::Serialize;

use crate::presenter::{Presenter, ReconnectChoice};
use crate::{ClientConfig, NightwatchError};

/// Inbound application frames kept for the embedding application before
/// the oldest are dropped.
const PASSTHROUGH_LIMIT: usize = 1024;

/// Connection facts for status displays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionInfo {
    pub connection_state: ConnectionState,
    /// Epoch seconds of the last inbound frame.
    pub last_activity: Option<f64>,
    /// Attempts made in the current reconnect sequence.
    pub reconnect_attempts: u32,
}

/// Builder for configuring a [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// use nightwatch::prelude::*;
///
/// let mut client = ClientBuilder::new()
///     .config(ClientConfig::load("nightwatch.json")?)
///     .local_user("ann")
///     .build_tcp(my_presenter);
/// client.connect(Endpoint::new("127.0.0.1", 5000)).await?;
/// client.run(async { let _ = tokio::signal::ctrl_c().await; }).await
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    local_user: Option<String>,
}

impl ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the username the local player logged in with.
    pub fn local_user(mut self, username: impl Into<String>) -> Self {
        self.local_user = Some(username.into());
        self
    }

    /// Builds a client over any connector and clock.
    pub fn build<C, P, K>(self, connector: C, presenter: P, clock: K) -> Client<C, P, K>
    where
        C: Connector,
        P: Presenter,
        K: Clock,
    {
        let mut client = Client::new(connector, presenter, clock, self.config);
        client.set_local_user(self.local_user);
        client
    }

    /// Builds a client that dials plain TCP and reads the system clock.
    #[cfg(feature = "tcp")]
    pub fn build_tcp<P: Presenter>(
        self,
        presenter: P,
    ) -> Client<nightwatch_transport::TcpConnector, P, SystemClock> {
        let connector = nightwatch_transport::TcpConnector::new(self.config.connect_timeout);
        self.build(connector, presenter, SystemClock)
    }
}

/// The client session.
///
/// Owns the transport, the heartbeat monitor, the reconnect coordinator,
/// and the night controller. Everything happens inside [`tick`](Self::tick)
/// or a method call on `&mut self`, so there is never more than one writer
/// on the connection.
pub struct Client<C: Connector, P: Presenter, K: Clock = SystemClock> {
    transport: TransportSession<C>,
    codec: JsonCodec,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectCoordinator,
    night: NightController,
    presenter: P,
    clock: K,
    config: ClientConfig,
    passthrough: VecDeque<(MessageType, Payload)>,
    /// Last connection state reported to the presenter.
    shown_state: ConnectionState,
    /// The user chose to reconnect from inside a callback; dial on the
    /// next tick.
    reconnect_requested: bool,
    /// A snapshot request is outstanding, so the next room info response
    /// is ours.
    awaiting_snapshot: bool,
}

impl<C, P, K> Client<C, P, K>
where
    C: Connector,
    P: Presenter,
    K: Clock,
{
    pub fn new(connector: C, presenter: P, clock: K, config: ClientConfig) -> Self {
        Self {
            transport: TransportSession::with_max_frame_len(connector, config.max_frame_len),
            codec: JsonCodec,
            heartbeat: HeartbeatMonitor::new(config.heartbeat()),
            reconnect: ReconnectCoordinator::new(config.reconnect()),
            night: NightController::new(config.night.clone()),
            presenter,
            clock,
            config,
            passthrough: VecDeque::new(),
            shown_state: ConnectionState::Disconnected,
            reconnect_requested: false,
            awaiting_snapshot: false,
        }
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Connects to the server and starts liveness detection.
    ///
    /// Clears any reconnect history: this is a fresh session.
    pub async fn connect(&mut self, endpoint: Endpoint) -> Result<(), NightwatchError> {
        self.reconnect.reset();
        self.reconnect_requested = false;
        self.show_state(ConnectionState::Connecting);
        let result = self.transport.connect(endpoint).await;
        self.sync_state();
        result?;
        self.heartbeat.reset(self.clock.now());
        Ok(())
    }

    /// Starts reconnecting to the last endpoint.
    ///
    /// The first attempt dials right away. If it fails, later attempts are
    /// dialled by [`tick`](Self::tick) on the backoff schedule.
    ///
    /// # Errors
    /// - [`SessionError::NoEndpoint`] if [`connect`](Self::connect) was
    ///   never called.
    /// - [`SessionError::ReconnectExhausted`] if the configured attempts
    ///   allow only this one and it failed.
    pub async fn attempt_reconnect(&mut self) -> Result<(), NightwatchError> {
        if self.transport.endpoint().is_none() {
            return Err(SessionError::NoEndpoint.into());
        }
        self.reconnect_requested = false;
        let ticket = self.reconnect.begin_manual()?;
        self.dial(ticket).await
    }

    /// Abandons the session after a loss: no further attempts fire, the
    /// room is forgotten, and the presenter is sent back to the entry
    /// screen.
    pub fn give_up(&mut self) {
        self.reconnect.give_up();
        self.end_session("reconnect cancelled");
    }

    /// Closes the connection. No reconnect prompt follows.
    pub fn disconnect(&mut self) {
        self.heartbeat.disarm();
        self.reconnect.reset();
        self.reconnect_requested = false;
        self.awaiting_snapshot = false;
        self.transport.disconnect();
        self.sync_state();
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Drives the client at the configured tick rate until `shutdown`
    /// completes.
    ///
    /// # Errors
    /// Returns when the session ends fatally
    /// ([`SessionError::ReconnectExhausted`]).
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), NightwatchError> {
        let mut scheduler = TickScheduler::new(self.config.tick());
        tokio::pin!(shutdown);
        tracing::info!(rate_hz = scheduler.tick_rate_hz(), "client loop running");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("client loop stopping");
                    return Ok(());
                }
                _ = scheduler.wait_for_tick() => {
                    self.tick().await?;
                    scheduler.record_tick_end();
                }
            }
        }
    }

    /// Runs one loop iteration.
    ///
    /// In order: drain and route every buffered frame, evaluate liveness,
    /// send a due probe, refresh the countdown, then dial a due reconnect
    /// attempt. Reading never waits.
    ///
    /// # Errors
    /// Only the fatal [`SessionError::ReconnectExhausted`]; everything
    /// else is handled here and reported through the presenter.
    pub async fn tick(&mut self) -> Result<(), NightwatchError> {
        let now = self.clock.now();
        self.receive(now).await;

        if let Some(lost) = self.heartbeat.check(now) {
            self.connection_lost(&SessionError::from(lost).into());
        }
        if let Some(probe) = self.heartbeat.probe_due(now) {
            if let Err(e) = self.send_request(&probe).await {
                tracing::debug!(error = %e, "probe not sent");
            }
        }

        let online = self.transport.is_connected() && !self.awaiting_snapshot;
        let events = self.night.tick(now, online);
        if let Err(e) = self.dispatch_events(events).await {
            tracing::debug!(error = %e, "countdown request not sent");
        }

        if self.reconnect_requested {
            self.reconnect_requested = false;
            match self.attempt_reconnect().await {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(error = %e, "reconnect not started"),
                Ok(()) => {}
            }
        } else if let Some(ticket) = self.reconnect.poll_due(now) {
            self.dial(ticket).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Player actions
    // -----------------------------------------------------------------------

    /// Submits `target` for the local role's action this phase.
    pub async fn submit_action(&mut self, target: &str) -> Result<(), NightwatchError> {
        self.require_connection()?;
        let events = self.night.submit(target)?;
        self.dispatch_events(events).await
    }

    /// Passes on this phase's action.
    pub async fn skip_action(&mut self) -> Result<(), NightwatchError> {
        self.require_connection()?;
        let events = self.night.skip()?;
        self.dispatch_events(events).await
    }

    /// Tells the server the role card has been read.
    pub async fn acknowledge_role_card(&mut self) -> Result<(), NightwatchError> {
        self.require_connection()?;
        let events = self.night.acknowledge_role_card()?;
        self.dispatch_events(events).await
    }

    /// Asks the server where the room stands; the answer is applied on a
    /// later tick.
    pub async fn request_resume(&mut self) -> Result<(), NightwatchError> {
        let request = self.night.snapshot_request().ok_or(StateError::NotInRoom)?;
        self.send_request(&request).await?;
        self.awaiting_snapshot = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Room and identity
    // -----------------------------------------------------------------------

    /// Records that the player joined `room_id`, e.g. after a successful
    /// join response.
    pub fn enter_room(&mut self, room_id: RoomId) {
        let events = self.night.enter_room(room_id);
        self.present_all(events);
    }

    pub fn leave_room(&mut self) {
        self.awaiting_snapshot = false;
        let events = self.night.leave_room();
        self.present_all(events);
    }

    pub fn set_local_user(&mut self, username: Option<String>) {
        self.night.set_local_user(username);
    }

    // -----------------------------------------------------------------------
    // Application traffic
    // -----------------------------------------------------------------------

    /// Sends a raw application frame (login, chat, votes, ...).
    pub async fn send(&mut self, msg_type: MessageType, payload: &[u8]) -> Result<(), NightwatchError> {
        self.write(msg_type, payload).await
    }

    /// Serializes `body` and sends it as one frame.
    pub async fn send_json<T: Serialize>(
        &mut self,
        msg_type: MessageType,
        body: &T,
    ) -> Result<(), NightwatchError> {
        let payload = self.codec.encode(body)?;
        self.write(msg_type, &payload).await
    }

    /// Takes every inbound frame the client doesn't handle itself, oldest
    /// first.
    pub fn drain_passthrough(&mut self) -> Vec<(MessageType, Payload)> {
        self.passthrough.drain(..).collect()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            connection_state: self.transport.state(),
            last_activity: self.heartbeat.last_activity(),
            reconnect_attempts: self.reconnect.attempts(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn night(&self) -> &NightController {
        &self.night
    }

    /// Seconds left in the current night phase.
    pub fn remaining(&self) -> Option<f64> {
        self.night.remaining(self.clock.now())
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Inbound routing
    // -----------------------------------------------------------------------

    async fn receive(&mut self, now: f64) {
        let frames = match self.transport.poll_receive() {
            Ok(frames) => frames,
            Err(TransportError::NotConnected) => return,
            Err(e) => {
                self.connection_lost(&e.into());
                return;
            }
        };
        for frame in &frames {
            self.route(frame, now).await;
        }
    }

    /// Hands one frame to its single owner.
    async fn route(&mut self, frame: &Frame, now: f64) {
        let msg = ServerMessage::from_frame(frame, &self.codec);
        if let Some(reply) = self.heartbeat.on_message(&msg, now) {
            if let Err(e) = self.send_request(&reply).await {
                tracing::debug!(error = %e, "probe reply not sent");
            }
        }

        let result = match msg {
            ServerMessage::Probe | ServerMessage::ProbeAnswer => return,
            ServerMessage::RoleAssigned(assignment) => Ok(self.night.on_role_assigned(&assignment)),
            ServerMessage::NightBegin(begin) => self.night.on_night_begin(&begin, now),
            ServerMessage::GuardStart(timing) => self.night.on_guard_start(&timing, now),
            ServerMessage::WolfStart(timing) => self.night.on_wolf_start(&timing, now),
            ServerMessage::NightResolved(resolution) => self.night.on_night_resolved(&resolution),
            ServerMessage::GameOver(result) => {
                self.awaiting_snapshot = false;
                Ok(self.night.on_game_over(&result))
            }
            ServerMessage::SeerResult(result) => Ok(self.night.on_seer_result(&result)),
            ServerMessage::ActionAck { kind, ack } => Ok(self.night.on_action_ack(kind, &ack)),
            ServerMessage::RoomSnapshot(snapshot) if self.awaiting_snapshot => {
                self.awaiting_snapshot = false;
                self.night.resume_from_snapshot(&snapshot)
            }
            ServerMessage::ServerError { message } => {
                tracing::warn!(%message, "server reported an error");
                self.presenter.on_notification(&message);
                return;
            }
            _ => {
                self.queue_passthrough(frame);
                return;
            }
        };

        match result {
            Ok(events) => {
                if let Err(e) = self.dispatch_events(events).await {
                    tracing::debug!(error = %e, "request not sent");
                }
            }
            Err(e) if e.is_benign() => {
                tracing::debug!(msg_type = %frame.msg_type, error = %e, "ignoring stale signal");
            }
            Err(StateError::SnapshotRejected(reason)) => {
                tracing::warn!(%reason, "resume refused");
                self.presenter.on_notification(&format!("could not resume: {reason}"));
            }
            Err(e) => {
                tracing::warn!(msg_type = %frame.msg_type, error = %e, "signal not applied");
            }
        }
    }

    fn queue_passthrough(&mut self, frame: &Frame) {
        if self.passthrough.len() >= PASSTHROUGH_LIMIT {
            tracing::warn!(limit = PASSTHROUGH_LIMIT, "passthrough queue full, dropping oldest");
            self.passthrough.pop_front();
        }
        tracing::trace!(msg_type = %frame.msg_type, "queued for application");
        self.passthrough
            .push_back((frame.msg_type, Payload::parse(&frame.payload)));
    }

    // -----------------------------------------------------------------------
    // Presenter fan-out
    // -----------------------------------------------------------------------

    /// Delivers night events and sends the requests among them.
    ///
    /// Every event is delivered even if a send fails; the first send error
    /// is returned.
    async fn dispatch_events(&mut self, events: Vec<NightEvent>) -> Result<(), NightwatchError> {
        let mut result = Ok(());
        for event in events {
            if let Some(request) = self.present(event) {
                if let Err(e) = self.send_request(&request).await {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }

    /// Delivers events where nothing can be sent.
    fn present_all(&mut self, events: Vec<NightEvent>) {
        for event in events {
            if let Some(request) = self.present(event) {
                tracing::debug!(?request, "dropping request raised while offline");
            }
        }
    }

    /// Shows one event. Returns it back if it is a request to send.
    fn present(&mut self, event: NightEvent) -> Option<ClientRequest> {
        match event {
            NightEvent::PhaseChanged { state, view } => {
                self.presenter.on_phase_changed(state, &view);
            }
            NightEvent::DeadlineTick { phase, remaining } => {
                self.presenter.on_deadline_tick(phase, remaining);
            }
            NightEvent::RoleRevealed { role, wolf_team } => {
                self.presenter.on_role_revealed(role, &wolf_team);
            }
            NightEvent::ActionResult(outcome) => self.presenter.on_action_result(&outcome),
            NightEvent::NightResolved {
                resolution,
                eliminated,
            } => self.presenter.on_night_resolved(&resolution, &eliminated),
            NightEvent::GameOver(result) => self.presenter.on_game_over(&result),
            NightEvent::Send(request) => return Some(request),
        }
        None
    }

    fn show_state(&mut self, state: ConnectionState) {
        if state != self.shown_state {
            self.shown_state = state;
            self.presenter.on_connection_state_changed(state);
        }
    }

    fn sync_state(&mut self) {
        self.show_state(self.transport.state());
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    async fn send_request(&mut self, request: &ClientRequest) -> Result<(), NightwatchError> {
        let payload = request.encode_body(&self.codec)?;
        self.write(request.message_type(), &payload).await
    }

    /// The one place frames leave the client.
    async fn write(&mut self, msg_type: MessageType, payload: &[u8]) -> Result<(), NightwatchError> {
        match self.transport.send(msg_type, payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = NightwatchError::from(e);
                if matches!(err, NightwatchError::Transport(TransportError::SendFailed(_))) {
                    self.connection_lost(&err);
                }
                Err(err)
            }
        }
    }

    fn require_connection(&self) -> Result<(), NightwatchError> {
        if self.transport.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected.into())
        }
    }

    // -----------------------------------------------------------------------
    // Loss and recovery
    // -----------------------------------------------------------------------

    /// Tears the link down and asks the user once whether to reconnect.
    fn connection_lost(&mut self, reason: &NightwatchError) {
        tracing::warn!(error = %reason, "connection lost");
        self.heartbeat.disarm();
        self.awaiting_snapshot = false;
        self.transport.disconnect();
        self.sync_state();

        if !self.reconnect.on_connection_lost() {
            return;
        }
        match self.presenter.on_reconnect_prompt(reason) {
            ReconnectChoice::Reconnect => self.reconnect_requested = true,
            ReconnectChoice::GiveUp => self.give_up(),
            ReconnectChoice::Undecided => {}
        }
    }

    async fn dial(&mut self, ticket: ReconnectAttempt) -> Result<(), NightwatchError> {
        tracing::info!(attempt = ticket.attempt, "reconnecting");
        self.show_state(ConnectionState::Connecting);
        let result = self.transport.reconnect().await;
        self.sync_state();
        let now = self.clock.now();

        match result {
            Ok(()) => {
                self.heartbeat.reset(now);
                if self.reconnect.record_success(ticket) {
                    self.presenter.on_connection_restored();
                }
                if self.config.resume_on_reconnect && self.night.room_id().is_some() {
                    if let Err(e) = self.request_resume().await {
                        tracing::warn!(error = %e, "resume request not sent");
                    }
                }
                Ok(())
            }
            Err(e) => match self.reconnect.record_failure(ticket, now) {
                ReconnectOutcome::Retrying { delay, .. } => {
                    self.presenter.on_notification(&format!(
                        "reconnect attempt {} failed ({e}), retrying in {}s",
                        ticket.attempt,
                        delay.as_secs()
                    ));
                    Ok(())
                }
                ReconnectOutcome::Exhausted { attempts } => {
                    let err = SessionError::ReconnectExhausted { attempts };
                    self.end_session(&err.to_string());
                    Err(err.into())
                }
                ReconnectOutcome::Stale => Ok(()),
            },
        }
    }

    /// Drops the connection and the room and sends the user back to the
    /// entry screen.
    fn end_session(&mut self, reason: &str) {
        tracing::warn!(%reason, "session ended");
        self.heartbeat.disarm();
        self.reconnect_requested = false;
        self.awaiting_snapshot = false;
        self.transport.disconnect();
        self.sync_state();
        let events = self.night.leave_room();
        self.present_all(events);
        self.presenter.on_return_to_entry(reason);
    }
}
