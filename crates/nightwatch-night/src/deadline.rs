//! Absolute per-phase deadlines.

use std::collections::BTreeMap;

use crate::Phase;

/// One absolute deadline (epoch seconds) per phase of one night.
///
/// Every surface that shows a countdown asks this for `remaining` instead
/// of running its own timer, so two views of the same phase always agree
/// and a view recreated halfway through picks up where the others are.
///
/// Each night gets a fresh instance inside its
/// [`PhaseContext`](crate::PhaseContext), which is how a new cycle starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeadlineSync {
    deadlines: BTreeMap<Phase, f64>,
}

impl DeadlineSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the deadline for `phase`.
    ///
    /// The first value recorded for a phase sticks; later calls are
    /// ignored and return `false`.
    pub fn set_deadline(&mut self, phase: Phase, epoch_secs: f64) -> bool {
        if self.deadlines.contains_key(&phase) {
            tracing::debug!(%phase, "deadline already set");
            return false;
        }
        self.deadlines.insert(phase, epoch_secs);
        tracing::debug!(%phase, deadline = epoch_secs, "deadline set");
        true
    }

    pub fn deadline(&self, phase: Phase) -> Option<f64> {
        self.deadlines.get(&phase).copied()
    }

    /// `max(0, deadline - now)`, or `None` if no deadline is recorded.
    pub fn remaining(&self, phase: Phase, now: f64) -> Option<f64> {
        self.deadline(phase).map(|d| (d - now).max(0.0))
    }
}
