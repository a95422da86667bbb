//! Calibrated timer
//!
//! [`Timer`] composes frequency discovery, capability detection, overhead
//! calibration and affinity control. Initialization runs once; afterwards the
//! timer is immutable and can be shared freely between threads.
//!
//! ```text
//! discover frequency ──0──> ErrCpuFreq
//!        │
//! detect RDTSCP ──missing──> ErrCounterUnsupported
//!        │
//! calibrate ──Failed tier──> ErrMeasurement
//!        │
//!      Ready
//! ```

mod config;
mod global;
mod state;

pub use config::TimerConfig;
pub use global::{
    SENTINEL_SECONDS, SENTINEL_STAMP, confidence_tier, diff, end_stamp, global, init, init_with,
    precision, start_stamp, status, timed_call,
};
pub use state::{TimerState, TimerStatus};

use crate::affinity::{AffinityController, AffinityGuard};
use crate::calibration::{self, CalibrationResult, ConfidenceTier, TierThresholds};
use crate::counter::{CounterBackend, Tsc};
use crate::probe::{self, FrequencySource, SystemFrequency};
use log::{info, warn};
use std::hint::black_box;

const NANOS_PER_SEC: f64 = 1e9;

/// Cycle-counter timer with calibrated overhead
pub struct Timer<C = Tsc> {
    counter: C,
    state: TimerState,
    affinity: AffinityController,
    thresholds: TierThresholds,
}

static_assertions::assert_impl_all!(Timer: Send, Sync);

impl Timer<Tsc> {
    /// Probe the machine and calibrate the hardware counter
    ///
    /// Fails only on an invalid `config`. A timer that could not get ready is
    /// still returned; check [`status`](Timer::status) or
    /// [`check`](Timer::check) before trusting measurements.
    pub fn initialize(config: &TimerConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self::initialize_validated(config))
    }

    fn initialize_validated(config: &TimerConfig) -> Self {
        let timer = Self::assemble(Tsc, &SystemFrequency, config);

        if timer.status() != TimerStatus::ErrCounterUnsupported && !probe::has_invariant_tsc() {
            warn!("Invariant TSC not reported, counter rate may follow frequency scaling");
        }

        timer
    }
}

impl<C: CounterBackend> Timer<C> {
    /// Run the full initialization pipeline on an arbitrary backend
    pub fn initialize_with<F: FrequencySource + ?Sized>(
        counter: C,
        frequency: &F,
        config: &TimerConfig,
    ) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self::assemble(counter, frequency, config))
    }

    fn assemble<F: FrequencySource + ?Sized>(
        counter: C,
        frequency: &F,
        config: &TimerConfig,
    ) -> Self {
        let state = Self::probe_and_calibrate(&counter, frequency, config);

        let affinity = if config.pin_affinity {
            AffinityController::detect()
        } else {
            AffinityController::disabled()
        };

        info!(
            "Timer initialized on {}: status={}, frequency={} Hz, overhead={:.3} cycles, confidence={}, pinning={}",
            counter.name(),
            state.status(),
            state.cpu_frequency_hz(),
            state.instruction_overhead_cycles(),
            state.confidence_tier(),
            affinity.is_pinning()
        );

        Self {
            counter,
            state,
            affinity,
            thresholds: config.calibration.thresholds,
        }
    }

    /// Build a timer from an already known state
    pub fn from_state(counter: C, state: TimerState, affinity: AffinityController) -> Self {
        Self {
            counter,
            state,
            affinity,
            thresholds: TierThresholds::default(),
        }
    }

    /// Use custom tier boundaries for [`error_bound`](Self::error_bound)
    pub fn with_thresholds(mut self, thresholds: TierThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    fn probe_and_calibrate<F: FrequencySource + ?Sized>(
        counter: &C,
        frequency: &F,
        config: &TimerConfig,
    ) -> TimerState {
        let hz = frequency.discover();
        if hz == 0 {
            warn!("CPU frequency unavailable, timer disabled");
            return TimerState::failed(TimerStatus::ErrCpuFreq, 0.0);
        }

        if !counter.is_supported() {
            warn!("{} not supported by this processor, timer disabled", counter.name());
            return TimerState::failed(TimerStatus::ErrCounterUnsupported, hz as f64);
        }

        let result = calibration::calibrate(counter, &config.calibration);
        if !result.is_reliable() {
            warn!(
                "Calibration margin {:.4} cycles too wide for mean {:.3}, timer disabled",
                result.stats.margin, result.stats.mean
            );
        }

        TimerState::calibrated(hz as f64, result)
    }

    pub fn status(&self) -> TimerStatus {
        self.state.status()
    }

    /// Map the status to the error that caused it
    pub fn check(&self) -> crate::Result<()> {
        match self.state.status() {
            TimerStatus::Ready => Ok(()),
            TimerStatus::ErrCpuFreq => Err(crate::Error::FrequencyUnavailable),
            TimerStatus::ErrCounterUnsupported => Err(crate::Error::CounterUnsupported),
            TimerStatus::ErrMeasurement => {
                let (margin, mean) = self
                    .state
                    .calibration()
                    .map_or((f64::NAN, f64::NAN), |c| (c.stats.margin, c.stats.mean));
                Err(crate::Error::CalibrationLowConfidence { margin, mean })
            }
        }
    }

    #[inline]
    fn ensure_ready(&self) -> crate::Result<()> {
        match self.state.status() {
            TimerStatus::Ready => Ok(()),
            status => Err(crate::Error::NotReady(status)),
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }

    pub fn affinity(&self) -> &AffinityController {
        &self.affinity
    }

    pub fn cpu_frequency_hz(&self) -> f64 {
        self.state.cpu_frequency_hz()
    }

    pub fn instruction_overhead_cycles(&self) -> f64 {
        self.state.instruction_overhead_cycles()
    }

    pub fn confidence_tier(&self) -> ConfidenceTier {
        self.state.confidence_tier()
    }

    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.state.calibration()
    }

    /// Relative error bound of the confidence tier
    pub fn error_bound(&self) -> Option<f64> {
        self.thresholds.error_bound(self.confidence_tier())
    }

    /// Duration of one counter tick in nanoseconds
    pub fn precision(&self) -> crate::Result<f64> {
        self.ensure_ready()?;
        Ok(NANOS_PER_SEC / self.state.cpu_frequency_hz())
    }

    /// Serialize, then read the counter
    #[inline(always)]
    pub fn start_stamp(&self) -> crate::Result<u64> {
        self.ensure_ready()?;
        Ok(self.counter.start_stamp())
    }

    /// Serialized read, then serialize
    #[inline(always)]
    pub fn end_stamp(&self) -> crate::Result<u64> {
        self.ensure_ready()?;
        Ok(self.counter.end_stamp())
    }

    /// Seconds between two stamps, net of the calibrated overhead
    ///
    /// Windows at or below the overhead, and stamps that run backwards,
    /// report zero.
    pub fn diff(&self, start: u64, end: u64) -> crate::Result<f64> {
        self.ensure_ready()?;
        Ok(self.cycles_to_seconds(end.saturating_sub(start)))
    }

    #[inline]
    fn cycles_to_seconds(&self, raw_cycles: u64) -> f64 {
        let net = raw_cycles as f64 - self.state.instruction_overhead_cycles();
        net.max(0.0) / self.state.cpu_frequency_hz()
    }

    /// Time `f` on a pinned core and return its output with the elapsed seconds
    ///
    /// `f` is not invoked when the timer is not ready.
    ///
    /// When pinning is active, the calling thread leaves with the default mask
    /// captured at initialization, not the mask it entered with. A thread that
    /// narrowed its own affinity must re-apply it afterwards.
    pub fn measure<F, R>(&self, f: F) -> crate::Result<(R, f64)>
    where
        F: FnOnce() -> R,
    {
        self.ensure_ready()?;

        let guard = self.pin_current_core();
        let start = self.counter.start_stamp();
        let output = black_box(f());
        let end = self.counter.end_stamp();
        drop(guard);

        Ok((output, self.cycles_to_seconds(end.saturating_sub(start))))
    }

    /// Time `f` on a pinned core
    ///
    /// Affinity is restored as in [`measure`](Self::measure): to the default
    /// mask, not the caller's previous one.
    pub fn timed_call<F, R>(&self, f: F) -> crate::Result<f64>
    where
        F: FnOnce() -> R,
    {
        self.measure(f).map(|(_, secs)| secs)
    }

    fn pin_current_core(&self) -> Option<AffinityGuard<'_>> {
        (self.affinity.is_pinning() && self.counter.reports_os_core())
            .then(|| self.affinity.pin(self.counter.current_core()))
    }
}

impl<C: CounterBackend> std::fmt::Debug for Timer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("counter", &self.counter.name())
            .field("state", &self.state)
            .field("affinity", &self.affinity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::ManualCounter;
    use crate::probe::FixedFrequency;
    use approx::assert_relative_eq;

    fn ready_timer(overhead: f64, hz: f64) -> Timer<ManualCounter> {
        let state = TimerState::ready(hz, overhead, ConfidenceTier::Tier1).unwrap();
        Timer::from_state(ManualCounter::new(0), state, AffinityController::disabled())
    }

    #[test]
    fn test_diff_subtracts_overhead() {
        let timer = ready_timer(20.0, 2_000_000_000.0);

        assert_relative_eq!(timer.diff(1000, 1050).unwrap(), 1.5e-8);
    }

    #[test]
    fn test_diff_clamps_to_zero() {
        let timer = ready_timer(20.0, 2_000_000_000.0);

        assert_eq!(timer.diff(1000, 1020).unwrap(), 0.0);
        assert_eq!(timer.diff(1000, 1005).unwrap(), 0.0);
        assert_eq!(timer.diff(1050, 1000).unwrap(), 0.0);
    }

    #[test]
    fn test_precision() {
        let timer = ready_timer(0.0, 2_500_000_000.0);

        assert_relative_eq!(timer.precision().unwrap(), 0.4);
    }

    #[test]
    fn test_initialize_with_manual_counter() {
        let timer = Timer::initialize_with(
            ManualCounter::with_step(0, 30),
            &FixedFrequency(3_000_000_000),
            &TimerConfig::quick(),
        )
        .unwrap();

        assert_eq!(timer.status(), TimerStatus::Ready);
        assert_eq!(timer.instruction_overhead_cycles(), 30.0);
        assert_eq!(timer.confidence_tier(), ConfidenceTier::Tier1);
        assert_eq!(timer.error_bound(), Some(0.01));
        assert!(timer.check().is_ok());
    }

    #[test]
    fn test_zero_frequency() {
        let timer = Timer::initialize_with(
            ManualCounter::with_step(0, 30),
            &FixedFrequency(0),
            &TimerConfig::quick(),
        )
        .unwrap();

        assert_eq!(timer.status(), TimerStatus::ErrCpuFreq);
        assert!(timer.calibration().is_none());
        assert!(matches!(timer.check(), Err(crate::Error::FrequencyUnavailable)));
        assert!(matches!(
            timer.precision(),
            Err(crate::Error::NotReady(TimerStatus::ErrCpuFreq))
        ));
    }

    #[test]
    fn test_measure_returns_output() {
        let timer = ready_timer(0.0, 1_000_000_000.0);

        let (value, secs) = timer
            .measure(|| {
                timer.counter().advance(500);
                42
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_relative_eq!(secs, 5e-7);
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let mut config = TimerConfig::quick();
        config.calibration.thresholds.tier1_divisor = 0.0;

        let result = Timer::initialize_with(
            ManualCounter::with_step(0, 30),
            &FixedFrequency(3_000_000_000),
            &config,
        );
        assert!(matches!(result, Err(crate::Error::Config(_))));

        assert!(matches!(Timer::initialize(&config), Err(crate::Error::Config(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_manual_counter_never_pins() {
        let counter = ManualCounter::with_step(0, 10);
        counter.set_core(0);
        let state = TimerState::ready(1e9, 0.0, ConfidenceTier::Tier1).unwrap();
        let timer = Timer::from_state(counter, state, AffinityController::detect());
        let Some(default) = timer.affinity().default_mask().cloned() else {
            return;
        };

        let (inside, _) = timer
            .measure(|| crate::affinity::AffinityMask::current().unwrap())
            .unwrap();

        assert_eq!(inside, default);
    }
}
