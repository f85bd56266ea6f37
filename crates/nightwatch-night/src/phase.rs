//! Phases, controller states, and the per-night context.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use nightwatch_protocol::{ActionKind, PlayerEntry, Role, RoomId};

use crate::DeadlineSync;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// A night sub-phase. Ordered: a later variant never precedes an earlier
/// one within the same night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    NightBegin,
    SeerPhase,
    GuardPhase,
    WolfPhase,
    Resolution,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Self::NightBegin,
        Self::SeerPhase,
        Self::GuardPhase,
        Self::WolfPhase,
        Self::Resolution,
    ];

    /// The role that acts during this phase.
    pub fn active_role(self) -> Option<Role> {
        match self {
            Self::SeerPhase => Some(Role::Seer),
            Self::GuardPhase => Some(Role::Guard),
            Self::WolfPhase => Some(Role::Werewolf),
            Self::NightBegin | Self::Resolution => None,
        }
    }

    /// The action submitted during this phase.
    pub fn action(self) -> Option<ActionKind> {
        match self {
            Self::SeerPhase => Some(ActionKind::SeerCheck),
            Self::GuardPhase => Some(ActionKind::GuardProtect),
            Self::WolfPhase => Some(ActionKind::WolfKill),
            Self::NightBegin | Self::Resolution => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NightBegin => write!(f, "NightBegin"),
            Self::SeerPhase => write!(f, "SeerPhase"),
            Self::GuardPhase => write!(f, "GuardPhase"),
            Self::WolfPhase => write!(f, "WolfPhase"),
            Self::Resolution => write!(f, "Resolution"),
        }
    }
}

// ---------------------------------------------------------------------------
// NightState
// ---------------------------------------------------------------------------

/// Where the controller stands.
///
/// ```text
///   Idle ──enter_room──→ Lobby ──302──→ RoleReveal ──303──→ Night(..) ──304──→ Day
///                                                              ↑                 │
///                                                              └──────303────────┘
/// ```
///
/// 305 (game over) goes back to `Lobby` from anywhere, keeping the room;
/// `leave_room` goes back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NightState {
    /// Not in a room.
    Idle,
    /// In a room, no game running.
    Lobby,
    /// Role dealt; the player is reading the role card.
    RoleReveal,
    Night(Phase),
    /// Daytime: no night phase is active.
    Day,
}

impl NightState {
    pub fn phase(self) -> Option<Phase> {
        match self {
            Self::Night(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for NightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Lobby => write!(f, "Lobby"),
            Self::RoleReveal => write!(f, "RoleReveal"),
            Self::Night(p) => write!(f, "Night({p})"),
            Self::Day => write!(f, "Day"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoleView
// ---------------------------------------------------------------------------

/// What the local player sees for the current state.
///
/// During a role's phase the player holding that role gets `Action`;
/// everyone else, observers and dead players included, gets `Waiting`.
/// Both show the same deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleView {
    /// Pick one of `targets`, or skip. Once `submitted`, input is closed.
    Action {
        kind: ActionKind,
        targets: Vec<String>,
        submitted: bool,
    },
    /// Someone else is acting.
    Waiting { active_role: Option<Role> },
    /// No night action applies (lobby, role card, day).
    Inactive,
}

impl RoleView {
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Action { submitted: false, .. })
    }
}

// ---------------------------------------------------------------------------
// PhaseContext
// ---------------------------------------------------------------------------

/// Everything known about the night in progress.
///
/// Created by the night-begins signal (or a mid-night snapshot), updated
/// in place as later phases start, and discarded at resolution or when
/// the player leaves the room.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseContext {
    pub room_id: RoomId,
    /// `None` when the local role is unknown, e.g. a resumed observer.
    pub local_role: Option<Role>,
    pub roster: Vec<PlayerEntry>,
    pub wolf_team: BTreeSet<String>,
    pub deadlines: DeadlineSync,
    /// Watching without taking part: only waiting views are shown.
    pub observer: bool,
    pub(crate) current: Phase,
    pub(crate) started: BTreeSet<Phase>,
    pub(crate) submitted: BTreeSet<Phase>,
    /// Durations announced up front by the night-begins signal, used when
    /// a later phase signal carries none.
    pub(crate) announced: BTreeMap<Phase, f64>,
}

impl PhaseContext {
    pub(crate) fn new(
        room_id: RoomId,
        local_role: Option<Role>,
        roster: Vec<PlayerEntry>,
        wolf_team: BTreeSet<String>,
        observer: bool,
    ) -> Self {
        Self {
            room_id,
            local_role,
            roster,
            wolf_team,
            deadlines: DeadlineSync::new(),
            observer,
            current: Phase::NightBegin,
            started: BTreeSet::new(),
            submitted: BTreeSet::new(),
            announced: BTreeMap::new(),
        }
    }

    pub fn current_phase(&self) -> Phase {
        self.current
    }

    pub fn is_started(&self, phase: Phase) -> bool {
        self.started.contains(&phase)
    }

    /// `true` if the night moved past `phase` without entering it.
    pub fn was_skipped(&self, phase: Phase) -> bool {
        phase < self.current && !self.started.contains(&phase)
    }

    pub fn has_submitted(&self, phase: Phase) -> bool {
        self.submitted.contains(&phase)
    }

    pub fn is_alive(&self, username: &str) -> bool {
        self.roster
            .iter()
            .find(|p| p.username == username)
            .is_some_and(|p| p.alive)
    }

    /// Marks players dead. Unknown names are ignored.
    pub(crate) fn mark_dead(&mut self, names: &[String]) {
        for entry in &mut self.roster {
            if names.contains(&entry.username) {
                entry.alive = false;
            }
        }
    }

    /// Players the local user may pick in `phase`.
    ///
    /// Living players only. The seer can't inspect themself and wolves
    /// can't target their own pack.
    pub(crate) fn targets(&self, phase: Phase, local_user: Option<&str>) -> Vec<String> {
        self.roster
            .iter()
            .filter(|p| p.alive)
            .filter(|p| match phase {
                Phase::SeerPhase => Some(p.username.as_str()) != local_user,
                Phase::WolfPhase => !self.wolf_team.contains(&p.username),
                _ => true,
            })
            .map(|p| p.username.clone())
            .collect()
    }
}
