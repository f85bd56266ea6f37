//! The night phase of a Nightwatch game, as seen by one client.
//!
//! A night is a fixed sequence of sub-phases, each owned by one role:
//!
//! ```text
//! NightBegin → SeerPhase → GuardPhase → WolfPhase → Resolution
//! ```
//!
//! The server decides when each one starts. [`NightController`] only
//! follows: it enters a sub-phase when the matching broadcast arrives, runs
//! that phase's entry actions once, and tells the presentation layer what
//! to show through [`NightEvent`]s. Local countdowns reaching zero never
//! move the machine; at most they trigger a skip *request*.
//!
//! # Key types
//!
//! - [`NightController`]: the state machine
//! - [`PhaseContext`]: everything known about the night in progress
//! - [`DeadlineSync`]: one absolute deadline per phase, shared by every view
//! - [`RoleView`]: what the local player may do right now
//! - [`NightConfig`]: auto-skip and fallback duration

mod config;
mod controller;
mod deadline;
mod error;
mod phase;

pub use config::NightConfig;
pub use controller::{ActionOutcome, NightController, NightEvent};
pub use deadline::DeadlineSync;
pub use error::StateError;
pub use phase::{NightState, Phase, PhaseContext, RoleView};
