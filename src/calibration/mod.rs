//! Measurement overhead calibration
//!
//! Times an empty measurement window many times over to estimate what the
//! stamp sequence itself costs, then classifies how far the estimate can be
//! trusted.
//!
//! ```text
//! warm-up (discarded) -> N empty windows -> mean, population σ
//! margin = z · σ / √N
//! margin ≤ mean/100   -> Tier1
//! margin ≤ mean/50    -> Tier2
//! margin ≤ mean/33.34 -> Tier3
//! otherwise           -> Failed
//! ```

mod stats;

pub use stats::SampleStats;

use crate::counter::CounterBackend;
use log::debug;
use serde::{Deserialize, Serialize};

/// Default number of calibration windows
pub const DEFAULT_SAMPLES: usize = 1_000_000;

/// Default number of discarded warm-up windows
pub const DEFAULT_WARMUP_ROUNDS: usize = 3;

/// z score of a two-sided 95% confidence interval
pub const Z_95: f64 = 1.96;

/// Confidence classification of a calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    /// Margin below 1% of the mean
    Tier1,
    /// Margin below 2% of the mean
    Tier2,
    /// Margin below 3% of the mean
    Tier3,
    /// Margin too wide to trust the overhead estimate
    Failed,
}

impl ConfidenceTier {
    /// Classify a margin of error against the mean it applies to
    ///
    /// NaN inputs classify as [`Failed`](Self::Failed).
    pub fn classify(mean: f64, margin: f64, thresholds: &TierThresholds) -> Self {
        if margin <= mean / thresholds.tier1_divisor {
            ConfidenceTier::Tier1
        } else if margin <= mean / thresholds.tier2_divisor {
            ConfidenceTier::Tier2
        } else if margin <= mean / thresholds.tier3_divisor {
            ConfidenceTier::Tier3
        } else {
            ConfidenceTier::Failed
        }
    }

    /// Numeric level: 1, 2 or 3, and 0 for a failed calibration
    pub fn level(&self) -> u8 {
        match self {
            ConfidenceTier::Tier1 => 1,
            ConfidenceTier::Tier2 => 2,
            ConfidenceTier::Tier3 => 3,
            ConfidenceTier::Failed => 0,
        }
    }

    /// Whether the overhead estimate is usable
    pub fn is_reliable(&self) -> bool {
        *self != ConfidenceTier::Failed
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceTier::Tier1 => write!(f, "tier 1 (<1%)"),
            ConfidenceTier::Tier2 => write!(f, "tier 2 (<2%)"),
            ConfidenceTier::Tier3 => write!(f, "tier 3 (<3%)"),
            ConfidenceTier::Failed => write!(f, "failed"),
        }
    }
}

/// Confidence level and tier boundaries
///
/// A tier `k` is granted when `margin <= mean / tierk_divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    /// z score used for the margin of error
    pub z_score: f64,

    pub tier1_divisor: f64,

    pub tier2_divisor: f64,

    pub tier3_divisor: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            z_score: Z_95,
            tier1_divisor: 100.0,
            tier2_divisor: 50.0,
            tier3_divisor: 33.34,
        }
    }
}

impl TierThresholds {
    /// Relative error bound a tier guarantees, `None` for a failed calibration
    pub fn error_bound(&self, tier: ConfidenceTier) -> Option<f64> {
        match tier {
            ConfidenceTier::Tier1 => Some(1.0 / self.tier1_divisor),
            ConfidenceTier::Tier2 => Some(1.0 / self.tier2_divisor),
            ConfidenceTier::Tier3 => Some(1.0 / self.tier3_divisor),
            ConfidenceTier::Failed => None,
        }
    }

    /// Validate thresholds
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.z_score.is_finite() && self.z_score > 0.0) {
            return Err(crate::Error::Config(
                "z score must be positive and finite".to_string(),
            ));
        }

        let divisors = [self.tier1_divisor, self.tier2_divisor, self.tier3_divisor];
        if divisors.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
            return Err(crate::Error::Config(
                "Tier divisors must be positive and finite".to_string(),
            ));
        }

        if self.tier1_divisor < self.tier2_divisor || self.tier2_divisor < self.tier3_divisor {
            return Err(crate::Error::Config(
                "Tier divisors must be non-increasing from tier 1 to tier 3".to_string(),
            ));
        }

        Ok(())
    }
}

/// Calibration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Number of empty measurement windows
    pub samples: usize,

    /// Windows run and discarded before sampling
    pub warmup_rounds: usize,

    /// Tier boundaries
    pub thresholds: TierThresholds,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            warmup_rounds: DEFAULT_WARMUP_ROUNDS,
            thresholds: TierThresholds::default(),
        }
    }
}

impl CalibrationConfig {
    /// Smaller sample for tests and quick diagnostics
    pub fn quick() -> Self {
        Self {
            samples: 10_000,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.samples == 0 {
            return Err(crate::Error::Config(
                "Calibration needs at least one sample".to_string(),
            ));
        }

        self.thresholds.validate()
    }
}

/// Raw cycle deltas of empty measurement windows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationSample {
    deltas: Vec<u64>,
}

impl CalibrationSample {
    /// Run the warm-up and sampling loops on `counter`
    pub fn collect<C: CounterBackend + ?Sized>(counter: &C, config: &CalibrationConfig) -> Self {
        for _ in 0..config.warmup_rounds {
            let start = counter.start_stamp();
            let end = counter.end_stamp();
            std::hint::black_box(end.wrapping_sub(start));
        }

        let mut deltas = Vec::with_capacity(config.samples);
        for _ in 0..config.samples {
            let start = counter.start_stamp();
            let end = counter.end_stamp();
            deltas.push(end.saturating_sub(start));
        }

        Self { deltas }
    }

    /// Wrap externally gathered deltas
    pub fn from_deltas(deltas: Vec<u64>) -> Self {
        Self { deltas }
    }

    pub fn deltas(&self) -> &[u64] {
        &self.deltas
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Summary statistics at the given z score
    pub fn stats(&self, z_score: f64) -> SampleStats {
        SampleStats::from_deltas(&self.deltas, z_score)
    }
}

/// Outcome of a calibration run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Mean cost of one empty measurement window (cycles, ≥ 0)
    pub overhead_cycles: f64,

    /// Confidence classification
    pub tier: ConfidenceTier,

    /// Sample statistics the classification is based on
    pub stats: SampleStats,
}

impl CalibrationResult {
    /// Evaluate a collected sample
    pub fn from_sample(sample: &CalibrationSample, thresholds: &TierThresholds) -> Self {
        let stats = sample.stats(thresholds.z_score);
        let tier = ConfidenceTier::classify(stats.mean, stats.margin, thresholds);

        Self {
            // NaN (empty sample) collapses to zero
            overhead_cycles: stats.mean.max(0.0),
            tier,
            stats,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.tier.is_reliable()
    }
}

/// Calibrate the measurement overhead of `counter`
///
/// Blocks for the whole sampling loop; with the default million samples
/// this takes on the order of a second on bare metal and longer under a
/// hypervisor that traps `cpuid`.
pub fn calibrate<C: CounterBackend + ?Sized>(
    counter: &C,
    config: &CalibrationConfig,
) -> CalibrationResult {
    let sample = CalibrationSample::collect(counter, config);
    let result = CalibrationResult::from_sample(&sample, &config.thresholds);

    debug!(
        "Calibrated {} over {} samples: mean {:.3} cycles, σ {:.3}, margin {:.4} -> {}",
        counter.name(),
        result.stats.count,
        result.stats.mean,
        result.stats.std_dev,
        result.stats.margin,
        result.tier
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::ManualCounter;

    #[test]
    fn test_classify_boundaries() {
        let t = TierThresholds::default();

        assert_eq!(ConfidenceTier::classify(100.0, 0.5, &t), ConfidenceTier::Tier1);
        assert_eq!(ConfidenceTier::classify(100.0, 1.0, &t), ConfidenceTier::Tier1);
        assert_eq!(ConfidenceTier::classify(100.0, 1.5, &t), ConfidenceTier::Tier2);
        assert_eq!(ConfidenceTier::classify(100.0, 2.0, &t), ConfidenceTier::Tier2);
        assert_eq!(ConfidenceTier::classify(100.0, 2.9, &t), ConfidenceTier::Tier3);
        assert_eq!(ConfidenceTier::classify(100.0, 3.5, &t), ConfidenceTier::Failed);
        assert_eq!(
            ConfidenceTier::classify(f64::NAN, f64::NAN, &t),
            ConfidenceTier::Failed
        );
    }

    #[test]
    fn test_classify_custom_thresholds() {
        let t = TierThresholds {
            tier1_divisor: 1000.0,
            tier2_divisor: 500.0,
            tier3_divisor: 200.0,
            ..Default::default()
        };

        assert_eq!(ConfidenceTier::classify(100.0, 0.9, &t), ConfidenceTier::Failed);
        assert_eq!(ConfidenceTier::classify(100.0, 0.4, &t), ConfidenceTier::Tier3);
        assert_eq!(ConfidenceTier::classify(100.0, 0.1, &t), ConfidenceTier::Tier1);
    }

    #[test]
    fn test_tier_levels() {
        assert_eq!(ConfidenceTier::Tier1.level(), 1);
        assert_eq!(ConfidenceTier::Tier3.level(), 3);
        assert_eq!(ConfidenceTier::Failed.level(), 0);
        assert!(!ConfidenceTier::Failed.is_reliable());
    }

    #[test]
    fn test_error_bound() {
        let t = TierThresholds::default();

        assert_eq!(t.error_bound(ConfidenceTier::Tier1), Some(0.01));
        assert_eq!(t.error_bound(ConfidenceTier::Tier2), Some(0.02));
        assert_eq!(t.error_bound(ConfidenceTier::Failed), None);
    }

    #[test]
    fn test_calibrate_constant_overhead() {
        let counter = ManualCounter::with_step(0, 20);
        let result = calibrate(&counter, &CalibrationConfig::quick());

        assert_eq!(result.overhead_cycles, 20.0);
        assert_eq!(result.tier, ConfidenceTier::Tier1);
        assert_eq!(result.stats.count, 10_000);
    }

    #[test]
    fn test_warmup_is_discarded() {
        let counter = ManualCounter::with_step(0, 7);
        let config = CalibrationConfig {
            samples: 100,
            warmup_rounds: 3,
            ..Default::default()
        };

        let sample = CalibrationSample::collect(&counter, &config);

        assert_eq!(sample.len(), 100);
        // 2 reads per window
        assert_eq!(counter.now(), (3 + 100) * 2 * 7);
    }

    #[test]
    fn test_noisy_sample_fails() {
        let mut deltas = vec![10u64; 50];
        deltas.extend(std::iter::repeat_n(1000u64, 50));
        let sample = CalibrationSample::from_deltas(deltas);

        let result = CalibrationResult::from_sample(&sample, &TierThresholds::default());

        assert_eq!(result.tier, ConfidenceTier::Failed);
        assert!(result.overhead_cycles > 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(CalibrationConfig::default().validate().is_ok());

        let empty = CalibrationConfig {
            samples: 0,
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let bad_z = TierThresholds {
            z_score: -1.0,
            ..Default::default()
        };
        assert!(bad_z.validate().is_err());

        let inverted = TierThresholds {
            tier1_divisor: 10.0,
            tier2_divisor: 50.0,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
