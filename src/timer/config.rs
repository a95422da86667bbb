use crate::calibration::CalibrationConfig;
use serde::{Deserialize, Serialize};

/// Timer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Overhead calibration settings
    pub calibration: CalibrationConfig,

    /// Pin timed calls to the current core
    pub pin_affinity: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            pin_affinity: true,
        }
    }
}

impl TimerConfig {
    /// Short calibration, for tests and diagnostics
    pub fn quick() -> Self {
        Self {
            calibration: CalibrationConfig::quick(),
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.calibration.validate()
    }
}
