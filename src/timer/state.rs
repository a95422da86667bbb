use crate::calibration::{CalibrationResult, ConfidenceTier};
use serde::{Deserialize, Serialize};

/// Readiness of a timer
///
/// Decided once during initialization and never changed afterwards. Every
/// error state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerStatus {
    /// Frequency known, serialized reads available, calibration trusted
    Ready,
    /// No frequency source reported a positive value
    ErrCpuFreq,
    /// The processor lacks the serializing counter read
    ErrCounterUnsupported,
    /// Calibration margin exceeded every confidence tier
    ErrMeasurement,
}

impl TimerStatus {
    pub fn is_ready(&self) -> bool {
        *self == TimerStatus::Ready
    }
}

impl std::fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerStatus::Ready => write!(f, "ready"),
            TimerStatus::ErrCpuFreq => write!(f, "CPU frequency unavailable"),
            TimerStatus::ErrCounterUnsupported => write!(f, "RDTSCP unsupported"),
            TimerStatus::ErrMeasurement => write!(f, "calibration unreliable"),
        }
    }
}

/// Everything a timer learned during initialization
///
/// Serialized for reports only; a state can be built through the validated
/// constructors and never parsed back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimerState {
    status: TimerStatus,
    cpu_frequency_hz: f64,
    instruction_overhead_cycles: f64,
    confidence_tier: ConfidenceTier,
    calibration: Option<CalibrationResult>,
}

impl TimerState {
    /// Fabricated ready state
    ///
    /// For hosts that already know their counter frequency and overhead, and
    /// for deterministic tests.
    pub fn ready(
        cpu_frequency_hz: f64,
        instruction_overhead_cycles: f64,
        confidence_tier: ConfidenceTier,
    ) -> crate::Result<Self> {
        if !(cpu_frequency_hz.is_finite() && cpu_frequency_hz > 0.0) {
            return Err(crate::Error::Config(
                "CPU frequency must be positive and finite".to_string(),
            ));
        }

        if !(instruction_overhead_cycles.is_finite() && instruction_overhead_cycles >= 0.0) {
            return Err(crate::Error::Config(
                "Instruction overhead must be non-negative and finite".to_string(),
            ));
        }

        if !confidence_tier.is_reliable() {
            return Err(crate::Error::Config(
                "A ready state needs a reliable confidence tier".to_string(),
            ));
        }

        Ok(Self {
            status: TimerStatus::Ready,
            cpu_frequency_hz,
            instruction_overhead_cycles,
            confidence_tier,
            calibration: None,
        })
    }

    /// State of a timer that failed before calibration
    pub fn failed(status: TimerStatus, cpu_frequency_hz: f64) -> Self {
        Self {
            status,
            cpu_frequency_hz,
            instruction_overhead_cycles: 0.0,
            confidence_tier: ConfidenceTier::Failed,
            calibration: None,
        }
    }

    /// State after a completed calibration
    ///
    /// The overhead is recorded even when the calibration is unreliable.
    pub fn calibrated(cpu_frequency_hz: f64, calibration: CalibrationResult) -> Self {
        let status = if calibration.is_reliable() {
            TimerStatus::Ready
        } else {
            TimerStatus::ErrMeasurement
        };

        Self {
            status,
            cpu_frequency_hz,
            instruction_overhead_cycles: calibration.overhead_cycles,
            confidence_tier: calibration.tier,
            calibration: Some(calibration),
        }
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    /// Nominal counter frequency, 0 when unknown
    pub fn cpu_frequency_hz(&self) -> f64 {
        self.cpu_frequency_hz
    }

    /// Cycles subtracted from every measurement
    pub fn instruction_overhead_cycles(&self) -> f64 {
        self.instruction_overhead_cycles
    }

    pub fn confidence_tier(&self) -> ConfidenceTier {
        self.confidence_tier
    }

    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibration.as_ref()
    }
}
