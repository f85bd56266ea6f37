//! Event-loop cadence and clocks for Nightwatch.
//!
//! The client is driven by one cooperative loop: every tick it polls the
//! transport, checks liveness, refreshes countdowns, and fires any due
//! reconnect attempt. [`TickScheduler`] paces that loop; [`Clock`] supplies
//! the epoch time every component compares deadlines against.
//!
//! # Integration
//!
//! ```ignore
//! let mut scheduler = TickScheduler::new(TickConfig::default());
//! loop {
//!     tokio::select! {
//!         _ = scheduler.wait_for_tick() => {
//!             client.tick().await?;
//!             scheduler.record_tick_end();
//!         }
//!         _ = shutdown.recv() => break,
//!     }
//! }
//! ```
//!
//! With `tick_rate_hz == 0` the scheduler never fires, which parks the
//! loop on its other `select!` branches.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// A slow tick is logged once its work takes this share of the slot.
const SLOW_TICK_SHARE: f64 = 0.8;

/// How often the client loop runs.
///
/// Countdowns only show whole seconds, so a few ticks per second is
/// plenty; the rate mostly bounds how long an inbound frame waits in the
/// socket buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConfig {
    /// Loop frequency. 0 disables ticking.
    pub tick_rate_hz: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { tick_rate_hz: 4 }
    }
}

impl TickConfig {
    /// Fastest supported loop.
    pub const MAX_TICK_RATE_HZ: u32 = 60;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self { tick_rate_hz }
    }

    /// Clamps the rate to [`Self::MAX_TICK_RATE_HZ`].
    pub fn validated(self) -> Self {
        if self.tick_rate_hz <= Self::MAX_TICK_RATE_HZ {
            return self;
        }
        warn!(
            rate = self.tick_rate_hz,
            max = Self::MAX_TICK_RATE_HZ,
            "tick_rate_hz above maximum, clamping"
        );
        Self::with_rate(Self::MAX_TICK_RATE_HZ)
    }

    /// Length of one tick, or `None` when ticking is disabled.
    pub fn tick_duration(&self) -> Option<Duration> {
        (self.tick_rate_hz > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz)))
    }
}

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, Copy)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// Whole ticks the loop slept through. Missed ticks are never replayed:
    /// the next tick is always one slot after the wake-up.
    pub missed: u64,
}

/// Paces the client event loop.
#[derive(Debug)]
pub struct TickScheduler {
    tick_rate_hz: u32,
    slot: Option<Duration>,
    ticks: u64,
    next_tick: Option<TokioInstant>,
    work_started: Option<Instant>,
    slowest: Duration,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let slot = config.tick_duration();
        debug!(rate_hz = config.tick_rate_hz, "tick scheduler created");
        Self {
            tick_rate_hz: config.tick_rate_hz,
            slot,
            ticks: 0,
            next_tick: slot.map(|d| TokioInstant::now() + d),
            work_started: None,
            slowest: Duration::ZERO,
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Waits for the next tick. Pends forever when ticking is disabled.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (Some(due), Some(slot)) = (self.next_tick, self.slot) else {
            return std::future::pending().await;
        };
        time::sleep_until(due).await;

        let woke = TokioInstant::now();
        let late_by = woke.saturating_duration_since(due);
        let missed = (late_by.as_nanos() / slot.as_nanos()) as u64;
        self.ticks += 1;
        self.next_tick = Some(woke + slot);
        self.work_started = Some(Instant::now());

        if missed > 0 {
            warn!(
                tick = self.ticks,
                missed,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "client loop fell behind"
            );
        }
        trace!(tick = self.ticks, "tick");

        TickInfo {
            tick: self.ticks,
            missed,
        }
    }

    /// Marks the end of this tick's work. Work that fills most of the slot
    /// means something on the loop is blocking, which is logged.
    pub fn record_tick_end(&mut self) {
        let (Some(started), Some(slot)) = (self.work_started.take(), self.slot) else {
            return;
        };
        let elapsed = started.elapsed();
        self.slowest = self.slowest.max(elapsed);
        if elapsed.as_secs_f64() >= slot.as_secs_f64() * SLOW_TICK_SHARE {
            warn!(
                tick = self.ticks,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                slot_ms = slot.as_secs_f64() * 1000.0,
                "slow tick"
            );
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Longest time spent between a tick and its [`record_tick_end`](Self::record_tick_end).
    pub fn slowest_tick(&self) -> Duration {
        self.slowest
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.tick_rate_hz
    }
}
