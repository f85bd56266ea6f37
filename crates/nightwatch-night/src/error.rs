//! Error types for the night state machine.

use crate::{NightState, Phase};

/// A signal or request the state machine could not apply.
///
/// Duplicate and out-of-order signals are expected on a real network, so
/// [`is_benign`](Self::is_benign) errors are logged and dropped rather
/// than surfaced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    /// The phase was already entered; its entry actions already ran.
    #[error("phase {phase} already started")]
    DuplicateTransition { phase: Phase },

    /// The signal belongs to a phase the night has already moved past.
    #[error("signal for {signal} arrived while in {current}")]
    UnexpectedPhase { current: NightState, signal: Phase },

    /// A night signal arrived with no night in progress.
    #[error("no night in progress")]
    NoActiveNight,

    /// The local player has no action in the current phase.
    #[error("no action available in {0}")]
    NotActionPhase(NightState),

    /// A decision was already submitted for this phase.
    #[error("already submitted for {phase}")]
    AlreadySubmitted { phase: Phase },

    /// The chosen player cannot be targeted.
    #[error("invalid target {0:?}")]
    InvalidTarget(String),

    /// The operation needs a room and none is known.
    #[error("not in a room")]
    NotInRoom,

    /// The server refused the snapshot request.
    #[error("snapshot rejected: {0}")]
    SnapshotRejected(String),
}

impl StateError {
    /// `true` for the errors caused by redelivery or reordering.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTransition { .. } | Self::UnexpectedPhase { .. }
        )
    }
}
