//! Liveness detection from inbound traffic.

use std::time::Duration;

use nightwatch_protocol::{ClientRequest, ServerMessage};

use crate::SessionError;

/// Timing for the heartbeat monitor.
///
/// The timeout must stay far above the check interval. The server can go
/// quiet for minutes during play while everyone reads and nobody acts.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often silence is evaluated.
    pub check_interval: Duration,
    /// Silence longer than this means the connection is gone.
    pub timeout: Duration,
    /// Interval for client-initiated probes. `None` disables them.
    pub probe_interval: Option<Duration>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(180),
            probe_interval: Some(Duration::from_secs(25)),
        }
    }
}

impl HeartbeatConfig {
    /// Smallest allowed timeout, as a multiple of the check interval.
    pub const MIN_TIMEOUT_FACTOR: u32 = 15;

    /// Raises a timeout that is too close to the check interval.
    pub fn validated(mut self) -> Self {
        let floor = self.check_interval * Self::MIN_TIMEOUT_FACTOR;
        if self.timeout < floor {
            tracing::warn!(
                timeout_secs = self.timeout.as_secs_f64(),
                floor_secs = floor.as_secs_f64(),
                "liveness timeout too short for check interval, raising"
            );
            self.timeout = floor;
        }
        self
    }
}

/// Emitted once when the link is declared dead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionLost {
    /// Seconds since the last inbound frame.
    pub silent_for: f64,
}

impl From<ConnectionLost> for SessionError {
    fn from(lost: ConnectionLost) -> Self {
        SessionError::LivenessTimeout {
            silent_for: lost.silent_for,
        }
    }
}

/// Tracks the time of the last inbound frame and decides when the
/// connection is dead.
///
/// The monitor is *armed* by [`reset`](Self::reset) when a connection comes
/// up and *disarmed* by [`disarm`](Self::disarm) when it goes away; a
/// disarmed monitor never reports anything.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_activity: Option<f64>,
    last_check: f64,
    last_probe: f64,
    armed: bool,
    lost: bool,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config: config.validated(),
            last_activity: None,
            last_check: 0.0,
            last_probe: 0.0,
            armed: false,
            lost: false,
        }
    }

    /// Arms the monitor for a fresh connection.
    pub fn reset(&mut self, now: f64) {
        self.last_activity = Some(now);
        self.last_check = now;
        self.last_probe = now;
        self.armed = true;
        self.lost = false;
        tracing::debug!(now, "heartbeat armed");
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Records evidence of life.
    pub fn record_activity(&mut self, now: f64) {
        // Never move backwards if frames are handed in out of order.
        let last = self.last_activity.map_or(now, |t| t.max(now));
        self.last_activity = Some(last);
    }

    /// Feeds one inbound message.
    ///
    /// Any message counts as activity. A server probe also returns the reply
    /// to send; an answer to our own probe needs none.
    pub fn on_message(&mut self, msg: &ServerMessage, now: f64) -> Option<ClientRequest> {
        self.record_activity(now);
        match msg {
            ServerMessage::Probe => {
                tracing::trace!("server probe, replying");
                Some(ClientRequest::ProbeReply)
            }
            ServerMessage::ProbeAnswer => {
                tracing::trace!("probe answered");
                None
            }
            _ => None,
        }
    }

    /// Evaluates silence, at most once per check interval.
    ///
    /// Returns `Some` exactly once per connection: the first check after
    /// the silence exceeds the timeout. Later checks stay quiet until
    /// [`reset`](Self::reset) arms the monitor again.
    pub fn check(&mut self, now: f64) -> Option<ConnectionLost> {
        if !self.armed || self.lost {
            return None;
        }
        if now - self.last_check < self.config.check_interval.as_secs_f64() {
            return None;
        }
        self.last_check = now;

        let silent_for = now - self.last_activity?;
        if silent_for > self.config.timeout.as_secs_f64() {
            self.lost = true;
            tracing::warn!(
                silent_for,
                timeout_secs = self.config.timeout.as_secs_f64(),
                "connection lost: no traffic from server"
            );
            return Some(ConnectionLost { silent_for });
        }
        None
    }

    /// Returns a probe to send if the probe interval has elapsed.
    pub fn probe_due(&mut self, now: f64) -> Option<ClientRequest> {
        let interval = self.config.probe_interval?;
        if !self.armed || self.lost {
            return None;
        }
        if now - self.last_probe < interval.as_secs_f64() {
            return None;
        }
        self.last_probe = now;
        Some(ClientRequest::Probe)
    }

    /// Epoch seconds of the last inbound frame, if any.
    pub fn last_activity(&self) -> Option<f64> {
        self.last_activity
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(HeartbeatConfig::default())
    }
}
