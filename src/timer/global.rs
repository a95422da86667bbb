//! Process-wide timer
//!
//! The free functions here mirror the [`Timer`] methods on a single lazily
//! initialized instance, but report failure through sentinels instead of
//! errors:
//!
//! - seconds and nanoseconds: [`SENTINEL_SECONDS`] (`-1.0`)
//! - stamps: [`SENTINEL_STAMP`] (`0`)
//!
//! A sentinel is a plain number; code that never looks at [`status`] cannot
//! tell `-1.0` apart from a real result without checking the sign. Check
//! [`status`] once, or call [`init`], before trusting any of these values.

use super::{Timer, TimerConfig, TimerStatus};
use crate::calibration::ConfidenceTier;
use std::sync::OnceLock;

/// Returned by [`precision`], [`diff`] and [`timed_call`] when the timer is not ready
pub const SENTINEL_SECONDS: f64 = -1.0;

/// Returned by [`start_stamp`] and [`end_stamp`] when the timer is not ready
pub const SENTINEL_STAMP: u64 = 0;

static TIMER: OnceLock<Timer> = OnceLock::new();

/// Process-wide timer, initialized with the default configuration on first use
///
/// The first call runs the full calibration and blocks until it is done;
/// concurrent callers wait for the same result.
pub fn global() -> &'static Timer {
    TIMER.get_or_init(|| Timer::initialize_validated(&TimerConfig::default()))
}

/// Initialize the process-wide timer and confirm it is ready
pub fn init() -> crate::Result<&'static Timer> {
    let timer = global();
    timer.check()?;
    Ok(timer)
}

/// Initialize the process-wide timer with `config`
///
/// Fails with [`AlreadyInitialized`](crate::Error::AlreadyInitialized) if
/// another configuration got there first.
pub fn init_with(config: TimerConfig) -> crate::Result<&'static Timer> {
    config.validate()?;

    let mut initialized_here = false;
    let timer = TIMER.get_or_init(|| {
        initialized_here = true;
        Timer::initialize_validated(&config)
    });

    if !initialized_here {
        return Err(crate::Error::AlreadyInitialized);
    }

    timer.check()?;
    Ok(timer)
}

pub fn status() -> TimerStatus {
    global().status()
}

/// Counter tick duration in nanoseconds, or [`SENTINEL_SECONDS`]
pub fn precision() -> f64 {
    global().precision().unwrap_or(SENTINEL_SECONDS)
}

pub fn confidence_tier() -> ConfidenceTier {
    global().confidence_tier()
}

/// Opening stamp of a measurement window, or [`SENTINEL_STAMP`]
#[inline]
pub fn start_stamp() -> u64 {
    global().start_stamp().unwrap_or(SENTINEL_STAMP)
}

/// Closing stamp of a measurement window, or [`SENTINEL_STAMP`]
#[inline]
pub fn end_stamp() -> u64 {
    global().end_stamp().unwrap_or(SENTINEL_STAMP)
}

/// Seconds between two stamps, or [`SENTINEL_SECONDS`]
pub fn diff(start: u64, end: u64) -> f64 {
    global().diff(start, end).unwrap_or(SENTINEL_SECONDS)
}

/// Seconds spent in `f` on a pinned core, or [`SENTINEL_SECONDS`]
///
/// `f` is not invoked when the timer is not ready.
pub fn timed_call<F, R>(f: F) -> f64
where
    F: FnOnce() -> R,
{
    global().timed_call(f).unwrap_or(SENTINEL_SECONDS)
}
