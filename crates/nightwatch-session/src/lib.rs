//! Connection health for the Nightwatch client.
//!
//! This crate decides *when* the connection is gone and *when* to try
//! again; it never touches the socket itself.
//!
//! 1. **Liveness** ([`HeartbeatMonitor`]): every inbound frame refreshes
//!    the activity timestamp; a server probe is answered; silence longer
//!    than the timeout yields [`ConnectionLost`] once.
//! 2. **Recovery** ([`ReconnectCoordinator`]): after a loss the user
//!    decides whether to reconnect; failed attempts are retried with
//!    exponential backoff until the attempt cap is hit.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client dispatcher (above)  ← feeds frames in, acts on the decisions
//!     ↕
//! Session Layer (this crate) ← pure state machines over epoch seconds
//!     ↕
//! Protocol Layer (below)     ← ServerMessage / ClientRequest
//! ```
//!
//! Both types take `now` as an argument rather than reading a clock, so
//! tests drive them with plain numbers.

mod error;
mod heartbeat;
mod reconnect;

pub use error::SessionError;
pub use heartbeat::{ConnectionLost, HeartbeatConfig, HeartbeatMonitor};
pub use reconnect::{
    ReconnectAttempt, ReconnectConfig, ReconnectCoordinator, ReconnectOutcome,
    ReconnectState,
};
