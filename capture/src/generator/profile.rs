use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Command list uploaded to the simulated sensor when none is supplied.
pub const DEMO_CONFIG: &str = include_str!("../../demos/simulated_sensor.cfg");

/// Behaviour of the simulated sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorProfile {
    pub seed: u64,
    /// Used until a `frameCfg` command sets the periodicity.
    pub frame_period_ms: f64,
    /// Upper bound on junk bytes emitted ahead of each frame.
    pub max_garbage: usize,
    /// Chance that the hardware frame counter jumps ahead.
    pub skip_probability: f64,
    pub max_detected_obj: u32,
    pub platform: u32,
    pub version: u32,
    /// How long a read waits before reporting a timeout.
    pub read_timeout_ms: u64,
}

impl Default for SensorProfile {
    fn default() -> Self {
        Self {
            seed: 0,
            frame_period_ms: 100.0,
            max_garbage: 24,
            skip_probability: 0.02,
            max_detected_obj: 12,
            platform: 0x6843,
            version: 0x0306_0000,
            read_timeout_ms: 1000,
        }
    }
}

impl SensorProfile {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    pub fn frame_period(&self) -> Duration {
        period_from_ms(self.frame_period_ms).unwrap_or(Duration::from_millis(100))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

pub(crate) fn period_from_ms(ms: f64) -> Option<Duration> {
    (ms.is_finite() && ms > 0.0).then(|| Duration::from_secs_f64(ms / 1000.0))
}
