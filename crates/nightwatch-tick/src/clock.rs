//! Epoch clocks.
//!
//! Every timing decision in the client (liveness timeout, backoff, phase
//! deadlines) compares absolute epoch seconds, so a process that was
//! suspended wakes up with the right answer instead of a stale counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time in epoch seconds.
pub trait Clock: Send + Sync + 'static {
    /// Seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// The operating system's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        // A clock set before 1970 reads as the epoch itself.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hold one handle while the
/// client owns another.
///
/// ```rust
/// use nightwatch_tick::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000.0);
/// let handle = clock.clone();
/// handle.advance(2.5);
/// assert_eq!(clock.now(), 1_002.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(to_millis(start))),
        }
    }

    /// Jumps to an absolute time.
    pub fn set(&self, now: f64) {
        self.millis.store(to_millis(now), Ordering::SeqCst);
    }

    /// Moves forward by `secs`.
    pub fn advance(&self, secs: f64) {
        self.millis.fetch_add(to_millis(secs), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}

fn to_millis(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}
