//! Client configuration.
//!
//! Everything has a default, so a config file only lists what it changes:
//!
//! ```json
//! {
//!   "liveness_timeout": 240,
//!   "max_reconnect_attempts": 8,
//!   "night": { "auto_skip_on_expiry": false }
//! }
//! ```
//!
//! Durations are written in seconds.

use std::path::Path;
use std::time::Duration;

use nightwatch_night::NightConfig;
use nightwatch_protocol::DEFAULT_MAX_FRAME_LEN;
use nightwatch_session::{HeartbeatConfig, ReconnectConfig};
use nightwatch_tick::TickConfig;
use serde::Deserialize;

use crate::NightwatchError;

/// Settings for every layer of the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How often inbound silence is evaluated. Default: 10 s.
    #[serde(with = "secs")]
    pub check_interval: Duration,
    /// Silence after which the connection is declared lost. Default: 180 s.
    #[serde(with = "secs")]
    pub liveness_timeout: Duration,
    /// Interval between client probes. `null` disables them. Default: 25 s.
    #[serde(with = "opt_secs")]
    pub probe_interval: Option<Duration>,
    /// Default: 5.
    pub max_reconnect_attempts: u32,
    /// Longest wait between reconnect attempts. Default: 30 s.
    #[serde(with = "secs")]
    pub backoff_cap: Duration,
    /// Default: 5 s.
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Event loop frequency. Default: 4 Hz.
    pub tick_rate_hz: u32,
    /// Ask the server for a room snapshot after every reconnect.
    pub resume_on_reconnect: bool,
    /// Largest accepted frame payload, in bytes. Default: 1 MiB.
    pub max_frame_len: usize,
    pub night: NightConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let heartbeat = HeartbeatConfig::default();
        let reconnect = ReconnectConfig::default();
        Self {
            check_interval: heartbeat.check_interval,
            liveness_timeout: heartbeat.timeout,
            probe_interval: heartbeat.probe_interval,
            max_reconnect_attempts: reconnect.max_attempts,
            backoff_cap: reconnect.cap,
            connect_timeout: reconnect.connect_timeout,
            tick_rate_hz: TickConfig::default().tick_rate_hz,
            resume_on_reconnect: true,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            night: NightConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    /// [`NightwatchError::Config`] on malformed JSON or wrongly typed fields.
    pub fn from_json(json: &str) -> Result<Self, NightwatchError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NightwatchError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            NightwatchError::Config(serde_json::Error::io(e))
        })?;
        tracing::debug!(path = %path.display(), "loading client config");
        Self::from_json(&text)
    }

    /// Heartbeat settings, with the timeout floor applied.
    pub fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            check_interval: self.check_interval,
            timeout: self.liveness_timeout,
            probe_interval: self.probe_interval,
        }
        .validated()
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_reconnect_attempts,
            cap: self.backoff_cap,
            connect_timeout: self.connect_timeout,
        }
    }

    pub fn tick(&self) -> TickConfig {
        TickConfig::with_rate(self.tick_rate_hz)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<f64>::deserialize(d)? {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
