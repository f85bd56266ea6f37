//! Reconnection with exponential backoff.
//!
//! The coordinator is a pure state machine: it tells the caller *which*
//! attempt to dial and *when*, and the caller reports back how it went.
//!
//! ```text
//!   Idle/Connected ──lost──→ AwaitingDecision ──begin_manual──→ Reconnecting
//!                                   ↑                            │  │  │
//!                                   └──────cancel_pending────────┘  │  │
//!          Connected ←──────────record_success─────────────────────┘  │
//!          GivingUp  ←──────────attempts exhausted / give_up──────────┘
//! ```
//!
//! Attempt 1 is dialled right away when the user asks for it. If attempt
//! `i` fails, attempt `i + 1` is due `min(2^(i+1), cap)` seconds later.
//!
//! Every attempt carries the generation it was scheduled under. A manual
//! restart, `give_up`, `cancel_pending` and success all bump the
//! generation, so a result or schedule from an older generation is
//! dropped instead of acting on the new state.

use std::time::Duration;

/// Backoff and timeout settings.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Attempts before giving up. Default: 5.
    pub max_attempts: u32,
    /// Upper bound on the delay between attempts. Default: 30 s.
    pub cap: Duration,
    /// How long a single dial may take. Default: 5 s.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            cap: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ReconnectConfig {
    /// Delay before attempt number `attempt`: `min(2^attempt, cap)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exp = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(exp).min(self.cap)
    }
}

/// Where the coordinator stands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectState {
    /// No loss seen since the last fresh start.
    Idle,
    /// Connection lost; waiting for the user to choose.
    AwaitingDecision,
    /// Working through attempts. `next_at` is when `attempt` is due, or
    /// `None` while it is being dialled.
    Reconnecting { attempt: u32, next_at: Option<f64> },
    /// The last reconnect succeeded.
    Connected,
    /// Attempts exhausted or the user opted out.
    GivingUp,
}

/// A ticket for one dial. Hand it back to
/// [`record_failure`](ReconnectCoordinator::record_failure) or
/// [`record_success`](ReconnectCoordinator::record_success).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    /// 1-based.
    pub attempt: u32,
    generation: u64,
}

/// What happened after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectOutcome {
    /// The next attempt is scheduled.
    Retrying {
        next_attempt: u32,
        at: f64,
        delay: Duration,
    },
    /// That was the last attempt.
    Exhausted { attempts: u32 },
    /// The attempt belonged to an older generation and was ignored.
    Stale,
}

#[derive(Debug, Clone)]
pub struct ReconnectCoordinator {
    config: ReconnectConfig,
    state: ReconnectState,
    generation: u64,
    attempts: u32,
}

impl ReconnectCoordinator {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            state: ReconnectState::Idle,
            generation: 0,
            attempts: 0,
        }
    }

    /// Notes a lost connection.
    ///
    /// Returns `true` if the user should now be asked whether to
    /// reconnect; `false` if a decision or reconnect is already underway.
    pub fn on_connection_lost(&mut self) -> bool {
        match self.state {
            ReconnectState::Idle | ReconnectState::Connected | ReconnectState::GivingUp => {
                self.state = ReconnectState::AwaitingDecision;
                tracing::info!("connection lost, awaiting reconnect decision");
                true
            }
            ReconnectState::AwaitingDecision | ReconnectState::Reconnecting { .. } => false,
        }
    }

    /// Starts a fresh reconnect sequence at attempt 1, to be dialled now.
    ///
    /// Any retry scheduled by an earlier sequence is invalidated.
    ///
    /// # Errors
    /// [`SessionError::ReconnectInProgress`](crate::SessionError) while an
    /// attempt is being dialled.
    pub fn begin_manual(&mut self) -> Result<ReconnectAttempt, crate::SessionError> {
        if let ReconnectState::Reconnecting { next_at: None, .. } = self.state {
            return Err(crate::SessionError::ReconnectInProgress);
        }
        self.generation += 1;
        self.attempts = 1;
        self.state = ReconnectState::Reconnecting {
            attempt: 1,
            next_at: None,
        };
        tracing::info!(generation = self.generation, "manual reconnect started");
        Ok(self.ticket(1))
    }

    /// Returns the scheduled attempt once it is due.
    pub fn poll_due(&mut self, now: f64) -> Option<ReconnectAttempt> {
        let ReconnectState::Reconnecting {
            attempt,
            next_at: Some(at),
        } = self.state
        else {
            return None;
        };
        if now < at {
            return None;
        }
        self.state = ReconnectState::Reconnecting {
            attempt,
            next_at: None,
        };
        self.attempts = attempt;
        tracing::debug!(attempt, "scheduled reconnect due");
        Some(self.ticket(attempt))
    }

    /// Reports a failed dial and schedules the next one, if any remain.
    pub fn record_failure(&mut self, ticket: ReconnectAttempt, now: f64) -> ReconnectOutcome {
        if !self.is_current(ticket) {
            tracing::debug!(attempt = ticket.attempt, "ignoring stale reconnect failure");
            return ReconnectOutcome::Stale;
        }

        if ticket.attempt >= self.config.max_attempts {
            self.generation += 1;
            self.state = ReconnectState::GivingUp;
            tracing::warn!(attempts = ticket.attempt, "reconnect attempts exhausted");
            return ReconnectOutcome::Exhausted {
                attempts: ticket.attempt,
            };
        }

        let next_attempt = ticket.attempt + 1;
        let delay = self.config.delay_before(next_attempt);
        let at = now + delay.as_secs_f64();
        self.state = ReconnectState::Reconnecting {
            attempt: next_attempt,
            next_at: Some(at),
        };
        tracing::info!(
            failed = ticket.attempt,
            next_attempt,
            delay_secs = delay.as_secs_f64(),
            "reconnect failed, retrying"
        );
        ReconnectOutcome::Retrying {
            next_attempt,
            at,
            delay,
        }
    }

    /// Reports a successful dial.
    ///
    /// Returns `true` exactly when the caller should announce that the
    /// connection was restored.
    pub fn record_success(&mut self, ticket: ReconnectAttempt) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(attempt = ticket.attempt, "ignoring stale reconnect success");
            return false;
        }
        self.generation += 1;
        self.attempts = 0;
        self.state = ReconnectState::Connected;
        tracing::info!(attempt = ticket.attempt, "connection restored");
        true
    }

    /// Stops reconnecting for good.
    pub fn give_up(&mut self) {
        self.generation += 1;
        self.state = ReconnectState::GivingUp;
        tracing::info!(attempts = self.attempts, "reconnect abandoned");
    }

    /// Drops any scheduled retry and goes back to waiting for a decision.
    pub fn cancel_pending(&mut self) {
        if let ReconnectState::Reconnecting { .. } = self.state {
            self.generation += 1;
            self.state = ReconnectState::AwaitingDecision;
            tracing::debug!("pending reconnect cancelled");
        }
    }

    /// Forgets all history after a fresh, user-initiated connect.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.attempts = 0;
        self.state = ReconnectState::Idle;
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    /// Attempts made in the current sequence.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    fn ticket(&self, attempt: u32) -> ReconnectAttempt {
        ReconnectAttempt {
            attempt,
            generation: self.generation,
        }
    }

    fn is_current(&self, ticket: ReconnectAttempt) -> bool {
        ticket.generation == self.generation
            && matches!(self.state, ReconnectState::Reconnecting { attempt, .. } if attempt == ticket.attempt)
    }
}

impl Default for ReconnectCoordinator {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
