//! # rdtsc-timer
//!
//! High-precision timers built on the serialized x86 time-stamp counter.
//!
//! ## Features
//!
//! - Nominal CPU frequency discovery (CPUID, then the OS)
//! - RDTSCP capability gating, no silent fallback to unserialized reads
//! - One-time statistical calibration of the measurement overhead
//! - Per-call core pinning with guaranteed restore
//!
//! ## Quick Start
//!
//! ```no_run
//! let timer = rdtsc_timer::init()?;
//!
//! let secs = timer.timed_call(|| std::thread::sleep(std::time::Duration::from_millis(1)))?;
//! println!("slept {secs:.9} s (±{:?})", timer.confidence_tier());
//! # Ok::<(), rdtsc_timer::Error>(())
//! ```
//!
//! The free functions ([`status`], [`diff`], [`timed_call`], ...) operate on
//! the same process-wide timer but report failures through sentinel values.
//! Check [`status`] once before trusting anything they return.

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
compile_error!("rdtsc-timer requires an x86 or x86_64 processor");

pub mod affinity;
pub mod calibration;
pub mod counter;
pub mod probe;
pub mod timer;

// Re-exports
pub use affinity::{AffinityController, AffinityGuard};
pub use calibration::{
    CalibrationConfig, CalibrationResult, CalibrationSample, ConfidenceTier, SampleStats,
    TierThresholds,
};
pub use counter::{CounterBackend, ManualCounter, Tsc};
pub use probe::{FixedFrequency, FrequencySource, SystemFrequency};
pub use timer::{
    SENTINEL_SECONDS, SENTINEL_STAMP, Timer, TimerConfig, TimerState, TimerStatus,
    confidence_tier, diff, end_stamp, global, init, init_with, precision, start_stamp, status,
    timed_call,
};

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("CPU frequency unavailable: no hardware or OS source reported a positive value")]
    FrequencyUnavailable,

    #[error("Serializing counter read (RDTSCP) is not supported by this processor")]
    CounterUnsupported,

    #[error("Calibration confidence too low: margin {margin:.3} cycles on a mean of {mean:.3}")]
    CalibrationLowConfidence { margin: f64, mean: f64 },

    #[error("Timer not ready: {0}")]
    NotReady(timer::TimerStatus),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process-wide timer is already initialized")]
    AlreadyInitialized,
}
