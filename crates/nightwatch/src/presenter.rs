//! The seam between the client and whatever renders it.

use nightwatch_night::{ActionOutcome, NightState, Phase, RoleView};
use nightwatch_protocol::{NightResolution, Payload, Role};
use nightwatch_transport::ConnectionState;

use crate::NightwatchError;

/// The user's answer to "connection lost, reconnect?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectChoice {
    /// Start reconnecting now.
    Reconnect,
    /// Abandon the session and return to the entry screen.
    GiveUp,
    /// No answer yet. The application calls
    /// [`Client::attempt_reconnect`](crate::Client::attempt_reconnect) or
    /// [`Client::give_up`](crate::Client::give_up) later.
    #[default]
    Undecided,
}

/// Receives everything the user should see.
///
/// Only the three required methods carry the night itself; the rest have
/// empty defaults so a headless presenter stays short.
///
/// Callbacks run on the client loop and must not block.
pub trait Presenter {
    /// The state machine entered `state`, or the view within it changed.
    fn on_phase_changed(&mut self, state: NightState, view: &RoleView);

    /// The countdown for `phase` reached a new whole second.
    fn on_deadline_tick(&mut self, phase: Phase, remaining_secs: f64);

    fn on_connection_state_changed(&mut self, state: ConnectionState);

    /// The connection was lost. Asked once per loss.
    fn on_reconnect_prompt(&mut self, _reason: &NightwatchError) -> ReconnectChoice {
        ReconnectChoice::Undecided
    }

    /// A reconnect succeeded after a loss. Fires once per recovery.
    fn on_connection_restored(&mut self) {}

    /// The session is over: reconnecting failed or the user gave up.
    fn on_return_to_entry(&mut self, _reason: &str) {}

    /// A transient, non-blocking message (server error, failed attempt).
    fn on_notification(&mut self, _message: &str) {}

    fn on_role_revealed(&mut self, _role: Option<Role>, _wolf_team: &[String]) {}

    fn on_action_result(&mut self, _outcome: &ActionOutcome) {}

    fn on_night_resolved(&mut self, _resolution: &NightResolution, _eliminated: &[String]) {}

    fn on_game_over(&mut self, _result: &Payload) {}
}

/// Discards everything and never answers prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn on_phase_changed(&mut self, _state: NightState, _view: &RoleView) {}
    fn on_deadline_tick(&mut self, _phase: Phase, _remaining_secs: f64) {}
    fn on_connection_state_changed(&mut self, _state: ConnectionState) {}
}
