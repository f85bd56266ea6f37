//! Night controller settings.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NightConfig {
    /// Ask the server to skip our action once its deadline has passed
    /// without a decision.
    pub auto_skip_on_expiry: bool,
    /// Used when the server announces a phase with neither a duration nor
    /// a deadline.
    #[serde(with = "secs")]
    pub default_phase_duration: Duration,
}

impl Default for NightConfig {
    fn default() -> Self {
        Self {
            auto_skip_on_expiry: true,
            default_phase_duration: Duration::from_secs(30),
        }
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
