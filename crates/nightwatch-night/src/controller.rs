//! The night controller: server-driven transitions with exactly-once entry.

use std::collections::BTreeSet;

use nightwatch_protocol::{
    ActionAck, ActionKind, ClientRequest, NightBegin, NightResolution, Payload,
    PhaseTiming, PlayerEntry, Role, RoleAssignment, RoomId, RoomSnapshot,
    SeerResult, SnapshotPhase,
};

use crate::{
    DeadlineSync, NightConfig, NightState, Phase, PhaseContext, RoleView,
    StateError,
};

/// Result of a submitted night action, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    SeerReveal { target: String, is_werewolf: bool },
    Ack {
        kind: ActionKind,
        success: bool,
        message: Option<String>,
    },
}

/// Something the presentation layer or the transport should act on.
#[derive(Debug, Clone, PartialEq)]
pub enum NightEvent {
    /// A new state was entered, or the view within it changed.
    PhaseChanged { state: NightState, view: RoleView },
    /// The countdown for `phase` moved to a new whole second.
    DeadlineTick { phase: Phase, remaining: f64 },
    RoleRevealed {
        role: Option<Role>,
        wolf_team: Vec<String>,
    },
    ActionResult(ActionOutcome),
    NightResolved {
        resolution: NightResolution,
        eliminated: Vec<String>,
    },
    GameOver(Payload),
    /// A request to send to the server.
    Send(ClientRequest),
}

/// Follows the server through the night.
///
/// Every handler returns the events it produced; signals that arrive twice
/// or after the night has moved on return a [benign](StateError::is_benign)
/// error and change nothing.
#[derive(Debug, Clone)]
pub struct NightController {
    config: NightConfig,
    state: NightState,
    room_id: Option<RoomId>,
    local_user: Option<String>,
    role: Option<Role>,
    wolf_team: BTreeSet<String>,
    roster: Vec<PlayerEntry>,
    context: Option<PhaseContext>,
    role_card_done: bool,
    /// Last countdown second reported, to avoid repeating it every tick.
    last_shown: Option<(Phase, u64)>,
}

impl NightController {
    pub fn new(config: NightConfig) -> Self {
        Self {
            config,
            state: NightState::Idle,
            room_id: None,
            local_user: None,
            role: None,
            wolf_team: BTreeSet::new(),
            roster: Vec::new(),
            context: None,
            role_card_done: false,
            last_shown: None,
        }
    }

    /// Sets who the local player is. Needed to pick targets and to tell a
    /// participant from an observer.
    pub fn set_local_user(&mut self, username: Option<String>) {
        self.local_user = username;
    }

    // -----------------------------------------------------------------------
    // Room lifecycle
    // -----------------------------------------------------------------------

    pub fn enter_room(&mut self, room_id: RoomId) -> Vec<NightEvent> {
        self.forget_room();
        self.room_id = Some(room_id);
        tracing::info!(%room_id, "entered room");
        self.set_state(NightState::Lobby)
    }

    /// Leaves the room, dropping any night in progress.
    pub fn leave_room(&mut self) -> Vec<NightEvent> {
        if let Some(room_id) = self.room_id {
            tracing::info!(%room_id, "left room");
        }
        self.forget_room();
        self.set_state(NightState::Idle)
    }

    /// `GAME_START_RES_AND_ROLE`: the local role is dealt.
    pub fn on_role_assigned(&mut self, assignment: &RoleAssignment) -> Vec<NightEvent> {
        if !assignment.is_success() {
            tracing::warn!(message = ?assignment.message, "game start reported failure");
            return Vec::new();
        }
        if self.room_id.is_none() {
            tracing::warn!("role assignment outside a room, ignoring");
            return Vec::new();
        }
        if !matches!(self.state, NightState::Idle | NightState::Lobby) {
            tracing::debug!(state = %self.state, "ignoring repeated role assignment");
            return Vec::new();
        }

        self.role = assignment.role;
        self.wolf_team = assignment.werewolf_team.iter().cloned().collect();
        self.role_card_done = false;
        tracing::info!(role = ?self.role, "role assigned");

        let mut events = vec![self.role_revealed()];
        events.extend(self.set_state(NightState::RoleReveal));
        events
    }

    /// The player has read the role card.
    ///
    /// # Errors
    /// [`StateError::NotActionPhase`] outside the role reveal, and
    /// [`StateError::NotInRoom`] if the room is unknown.
    pub fn acknowledge_role_card(&mut self) -> Result<Vec<NightEvent>, StateError> {
        if self.state != NightState::RoleReveal {
            return Err(StateError::NotActionPhase(self.state));
        }
        let room_id = self.room_id.ok_or(StateError::NotInRoom)?;
        if self.role_card_done {
            return Ok(Vec::new());
        }
        self.role_card_done = true;
        Ok(vec![NightEvent::Send(ClientRequest::RoleCardDone { room_id })])
    }

    // -----------------------------------------------------------------------
    // Phase signals
    // -----------------------------------------------------------------------

    /// `PHASE_NIGHT`: creates the night context, then enters `NightBegin`
    /// and, under the same signal, `SeerPhase`.
    pub fn on_night_begin(
        &mut self,
        begin: &NightBegin,
        now: f64,
    ) -> Result<Vec<NightEvent>, StateError> {
        if self.context.as_ref().is_some_and(|c| c.is_started(Phase::NightBegin)) {
            return Err(StateError::DuplicateTransition {
                phase: Phase::NightBegin,
            });
        }
        let room_id = begin.room_id.or(self.room_id).ok_or(StateError::NotInRoom)?;
        self.room_id = Some(room_id);
        if !begin.players.is_empty() {
            self.roster = begin.players.clone();
        }

        let mut ctx = self.new_context(room_id);
        for (phase, duration) in [
            (Phase::SeerPhase, begin.seer_duration),
            (Phase::GuardPhase, begin.guard_duration),
            (Phase::WolfPhase, begin.wolf_duration),
        ] {
            if let Some(d) = duration {
                ctx.announced.insert(phase, d);
            }
        }
        self.context = Some(ctx);
        tracing::info!(%room_id, players = self.roster.len(), "night begins");

        let mut events = self.enter(Phase::NightBegin, begin.duration.map(|d| now + d));
        let seer_deadline = self.resolve_deadline(Phase::SeerPhase, begin.seer_timing(), now);
        events.extend(self.enter(Phase::SeerPhase, Some(seer_deadline)));
        Ok(events)
    }

    /// `PHASE_GUARD_START`.
    pub fn on_guard_start(
        &mut self,
        timing: &PhaseTiming,
        now: f64,
    ) -> Result<Vec<NightEvent>, StateError> {
        self.advance(Phase::GuardPhase, *timing, now)
    }

    /// `PHASE_WOLF_START`.
    pub fn on_wolf_start(
        &mut self,
        timing: &PhaseTiming,
        now: f64,
    ) -> Result<Vec<NightEvent>, StateError> {
        self.advance(Phase::WolfPhase, *timing, now)
    }

    /// `PHASE_DAY`: marks the dead, closes the night, and moves to day.
    pub fn on_night_resolved(
        &mut self,
        resolution: &NightResolution,
    ) -> Result<Vec<NightEvent>, StateError> {
        let Some(ctx) = self.context.as_mut() else {
            return Err(StateError::NoActiveNight);
        };
        let eliminated = resolution.eliminated();
        ctx.mark_dead(&eliminated);
        self.roster = ctx.roster.clone();
        if let NightResolution::Unrecognized(map) = resolution {
            tracing::warn!(keys = ?map.keys().collect::<Vec<_>>(), "unrecognized night result shape");
        }
        tracing::info!(?eliminated, "night resolved");

        let mut events = self.enter(Phase::Resolution, None);
        events.push(NightEvent::NightResolved {
            resolution: resolution.clone(),
            eliminated,
        });
        self.context = None;
        events.extend(self.set_state(NightState::Day));
        Ok(events)
    }

    /// `GAME_OVER`: the game is finished. The player stays seated in the
    /// room and is back in its lobby, ready for the next deal.
    pub fn on_game_over(&mut self, result: &Payload) -> Vec<NightEvent> {
        tracing::info!(room_id = ?self.room_id, "game over");
        self.forget_game();
        let next = if self.room_id.is_some() {
            NightState::Lobby
        } else {
            NightState::Idle
        };
        let mut events = vec![NightEvent::GameOver(result.clone())];
        events.extend(self.set_state(next));
        events
    }

    pub fn on_seer_result(&mut self, result: &SeerResult) -> Vec<NightEvent> {
        vec![NightEvent::ActionResult(ActionOutcome::SeerReveal {
            target: result.target_username.clone(),
            is_werewolf: result.is_werewolf,
        })]
    }

    /// Wolf/guard acknowledgement.
    ///
    /// A rejection during the same phase reopens input, so the player can
    /// choose again before the deadline.
    pub fn on_action_ack(&mut self, kind: ActionKind, ack: &ActionAck) -> Vec<NightEvent> {
        let success = ack.is_success();
        let mut events = vec![NightEvent::ActionResult(ActionOutcome::Ack {
            kind,
            success,
            message: ack.message.clone(),
        })];

        if !success {
            let reopened = match (self.state.phase(), self.context.as_mut()) {
                (Some(phase), Some(ctx)) if phase.action() == Some(kind) => {
                    ctx.submitted.remove(&phase)
                }
                _ => false,
            };
            if reopened {
                tracing::info!(?kind, message = ?ack.message, "action rejected, input reopened");
                events.push(self.phase_changed());
            }
        }
        events
    }

    // -----------------------------------------------------------------------
    // Local decisions
    // -----------------------------------------------------------------------

    /// Submits `target` for the current phase's action.
    ///
    /// Input closes immediately; the phase itself only ends when the
    /// server says so.
    ///
    /// # Errors
    /// [`StateError::NotActionPhase`], [`StateError::AlreadySubmitted`], or
    /// [`StateError::InvalidTarget`].
    pub fn submit(&mut self, target: &str) -> Result<Vec<NightEvent>, StateError> {
        self.decide(Some(target))
    }

    /// Explicitly passes on the current phase's action.
    pub fn skip(&mut self) -> Result<Vec<NightEvent>, StateError> {
        self.decide(None)
    }

    /// Refreshes the countdown.
    ///
    /// Reports a [`NightEvent::DeadlineTick`] whenever the whole-second
    /// countdown changes. When the deadline has passed with input still
    /// open, requests a skip (if configured). Never changes the phase.
    ///
    /// `online` is false while the link is down or the night has not yet
    /// been re-synced after a reconnect. The countdown still runs then, but
    /// no skip is requested and input stays open.
    pub fn tick(&mut self, now: f64, online: bool) -> Vec<NightEvent> {
        let Some(phase) = self.state.phase() else {
            return Vec::new();
        };
        let Some(remaining) = self.remaining(now) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let shown = remaining.ceil() as u64;
        if self.last_shown != Some((phase, shown)) {
            self.last_shown = Some((phase, shown));
            events.push(NightEvent::DeadlineTick { phase, remaining });
        }

        if remaining <= 0.0
            && online
            && self.config.auto_skip_on_expiry
            && self.current_view().accepts_input()
        {
            tracing::info!(%phase, "deadline passed without a decision, requesting skip");
            match self.decide(None) {
                Ok(more) => events.extend(more),
                Err(e) => tracing::debug!(error = %e, "auto-skip not possible"),
            }
        }
        events
    }

    // -----------------------------------------------------------------------
    // Resume
    // -----------------------------------------------------------------------

    /// Rebuilds state from an authoritative snapshot after a reconnect.
    ///
    /// Enters the snapshot's state directly: the role card, day, or the
    /// running night sub-phase with its server-side deadline, never the
    /// full phase duration. A player missing from the roster, or with no
    /// known role, resumes as an observer.
    ///
    /// # Errors
    /// [`StateError::SnapshotRejected`] if the server refused, and
    /// [`StateError::NotInRoom`] if no room can be determined.
    pub fn resume_from_snapshot(
        &mut self,
        snapshot: &RoomSnapshot,
    ) -> Result<Vec<NightEvent>, StateError> {
        if snapshot.is_failure() {
            let reason = snapshot.message.clone().unwrap_or_else(|| "no reason".into());
            return Err(StateError::SnapshotRejected(reason));
        }
        let room_id = snapshot.room_id.or(self.room_id).ok_or(StateError::NotInRoom)?;

        self.context = None;
        self.room_id = Some(room_id);
        self.role = snapshot.role;
        self.wolf_team = snapshot.werewolf_team.iter().cloned().collect();
        if !snapshot.players.is_empty() {
            self.roster = snapshot.players.clone();
        }
        self.role_card_done = false;

        let phase = snapshot.phase.unwrap_or(SnapshotPhase::Lobby);
        tracing::info!(%room_id, ?phase, observer = self.is_observer(), "resuming from snapshot");

        let events = match phase {
            SnapshotPhase::Lobby => self.set_state(NightState::Lobby),
            SnapshotPhase::RoleReveal => {
                let mut events = vec![self.role_revealed()];
                events.extend(self.set_state(NightState::RoleReveal));
                events
            }
            SnapshotPhase::Day => self.set_state(NightState::Day),
            SnapshotPhase::NightBegin
            | SnapshotPhase::Seer
            | SnapshotPhase::Guard
            | SnapshotPhase::Wolf => {
                let (target, deadline) = match phase {
                    SnapshotPhase::Guard => (Phase::GuardPhase, snapshot.deadlines.guard),
                    SnapshotPhase::Wolf => (Phase::WolfPhase, snapshot.deadlines.wolf),
                    _ => (Phase::SeerPhase, snapshot.deadlines.seer),
                };
                let mut ctx = self.new_context(room_id);
                ctx.started.extend(Phase::ALL.into_iter().filter(|p| *p < target));
                self.context = Some(ctx);
                self.enter(target, deadline)
            }
        };
        Ok(events)
    }

    /// The request that asks the server for a resume snapshot.
    pub fn snapshot_request(&self) -> Option<ClientRequest> {
        self.room_id.map(|room_id| ClientRequest::RoomSnapshot { room_id })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> NightState {
        self.state
    }

    pub fn context(&self) -> Option<&PhaseContext> {
        self.context.as_ref()
    }

    pub fn deadlines(&self) -> Option<&DeadlineSync> {
        self.context.as_ref().map(|c| &c.deadlines)
    }

    /// Seconds left in the current night phase.
    pub fn remaining(&self, now: f64) -> Option<f64> {
        let phase = self.state.phase()?;
        self.deadlines()?.remaining(phase, now)
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.room_id
    }

    pub fn local_role(&self) -> Option<Role> {
        self.role
    }

    pub fn roster(&self) -> &[PlayerEntry] {
        &self.roster
    }

    /// What the local player sees right now.
    pub fn current_view(&self) -> RoleView {
        let NightState::Night(phase) = self.state else {
            return RoleView::Inactive;
        };
        let Some(ctx) = self.context.as_ref() else {
            return RoleView::Inactive;
        };
        let active_role = phase.active_role();
        let waiting = RoleView::Waiting { active_role };

        let (Some(kind), Some(role)) = (phase.action(), active_role) else {
            return waiting;
        };
        if ctx.observer || ctx.local_role != Some(role) {
            return waiting;
        }
        let local = self.local_user.as_deref();
        let dead = local.is_some_and(|u| {
            ctx.roster.iter().any(|p| p.username == u && !p.alive)
        });
        if dead {
            return waiting;
        }

        RoleView::Action {
            kind,
            targets: ctx.targets(phase, local),
            submitted: ctx.has_submitted(phase),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn advance(
        &mut self,
        target: Phase,
        timing: PhaseTiming,
        now: f64,
    ) -> Result<Vec<NightEvent>, StateError> {
        let Some(ctx) = self.context.as_ref() else {
            return Err(StateError::NoActiveNight);
        };
        if ctx.is_started(target) {
            return Err(StateError::DuplicateTransition { phase: target });
        }
        if ctx.current > target {
            return Err(StateError::UnexpectedPhase {
                current: self.state,
                signal: target,
            });
        }
        let deadline = self.resolve_deadline(target, timing, now);
        Ok(self.enter(target, Some(deadline)))
    }

    /// Runs the entry actions of `phase`. Callers have checked the guards.
    fn enter(&mut self, phase: Phase, deadline: Option<f64>) -> Vec<NightEvent> {
        let Some(ctx) = self.context.as_mut() else {
            return Vec::new();
        };
        for skipped in Phase::ALL
            .into_iter()
            .filter(|p| *p > ctx.current && *p < phase && !ctx.started.contains(p))
        {
            tracing::debug!(phase = %skipped, "phase skipped");
        }
        ctx.current = phase;
        ctx.started.insert(phase);
        if let Some(at) = deadline {
            ctx.deadlines.set_deadline(phase, at);
        }
        tracing::info!(room_id = %ctx.room_id, %phase, deadline = ?deadline, "phase entered");

        self.state = NightState::Night(phase);
        self.last_shown = None;
        vec![self.phase_changed()]
    }

    fn decide(&mut self, target: Option<&str>) -> Result<Vec<NightEvent>, StateError> {
        let phase = self
            .state
            .phase()
            .ok_or(StateError::NotActionPhase(self.state))?;
        let RoleView::Action {
            kind,
            targets,
            submitted,
        } = self.current_view()
        else {
            return Err(StateError::NotActionPhase(self.state));
        };
        if submitted {
            return Err(StateError::AlreadySubmitted { phase });
        }
        if let Some(t) = target {
            if !targets.iter().any(|name| name == t) {
                return Err(StateError::InvalidTarget(t.to_string()));
            }
        }
        let Some(ctx) = self.context.as_mut() else {
            return Err(StateError::NoActiveNight);
        };
        ctx.submitted.insert(phase);
        tracing::info!(%phase, ?kind, target = ?target, "night action submitted");

        let request = ClientRequest::RoleAction {
            kind,
            room_id: ctx.room_id,
            target: target.map(str::to_string),
        };
        Ok(vec![NightEvent::Send(request), self.phase_changed()])
    }

    /// An absolute deadline wins; otherwise `now` plus the announced
    /// duration; otherwise the configured fallback.
    fn resolve_deadline(&self, phase: Phase, timing: PhaseTiming, now: f64) -> f64 {
        let announced = self
            .context
            .as_ref()
            .and_then(|c| c.announced.get(&phase).copied());
        timing
            .deadline
            .or_else(|| timing.duration.or(announced).map(|d| now + d))
            .unwrap_or_else(|| now + self.config.default_phase_duration.as_secs_f64())
    }

    fn new_context(&self, room_id: RoomId) -> PhaseContext {
        PhaseContext::new(
            room_id,
            self.role,
            self.roster.clone(),
            self.wolf_team.clone(),
            self.is_observer(),
        )
    }

    fn is_observer(&self) -> bool {
        if self.role.is_none() {
            return true;
        }
        match &self.local_user {
            Some(u) if !self.roster.is_empty() => {
                !self.roster.iter().any(|p| &p.username == u)
            }
            _ => false,
        }
    }

    fn role_revealed(&self) -> NightEvent {
        NightEvent::RoleRevealed {
            role: self.role,
            wolf_team: self.wolf_team.iter().cloned().collect(),
        }
    }

    fn phase_changed(&self) -> NightEvent {
        NightEvent::PhaseChanged {
            state: self.state,
            view: self.current_view(),
        }
    }

    fn set_state(&mut self, state: NightState) -> Vec<NightEvent> {
        self.state = state;
        self.last_shown = None;
        vec![self.phase_changed()]
    }

    fn forget_room(&mut self) {
        self.forget_game();
        self.room_id = None;
    }

    fn forget_game(&mut self) {
        self.context = None;
        self.role = None;
        self.wolf_team.clear();
        self.roster.clear();
        self.role_card_done = false;
    }
}

impl Default for NightController {
    fn default() -> Self {
        Self::new(NightConfig::default())
    }
}
