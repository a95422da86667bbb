//! Deterministic counter for tests and simulated time

use super::CounterBackend;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Counter whose value only moves when told to
///
/// Every read returns the current value and then advances it by a fixed
/// step, which models the constant cost of the read itself. With a step of
/// `s`, a start/end stamp pair with no work between them is exactly `s`
/// cycles apart, so calibrating against this counter yields an overhead of
/// `s` with zero variance.
#[derive(Debug, Default)]
pub struct ManualCounter {
    now: AtomicU64,
    step: AtomicU64,
    core: AtomicU32,
}

impl ManualCounter {
    /// Create a counter starting at `start` that advances only via [`advance`](Self::advance)
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
            step: AtomicU64::new(0),
            core: AtomicU32::new(0),
        }
    }

    /// Create a counter where every read costs `step` cycles
    pub fn with_step(start: u64, step: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
            step: AtomicU64::new(step),
            core: AtomicU32::new(0),
        }
    }

    /// Move the counter forward
    pub fn advance(&self, cycles: u64) {
        self.now.fetch_add(cycles, Ordering::AcqRel);
    }

    /// Change the per-read cost
    pub fn set_step(&self, step: u64) {
        self.step.store(step, Ordering::Release);
    }

    /// Change the core reported by serialized reads
    pub fn set_core(&self, core: u32) {
        self.core.store(core, Ordering::Release);
    }

    /// Current value without advancing
    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    #[inline]
    fn tick(&self) -> u64 {
        let step = self.step.load(Ordering::Acquire);
        self.now.fetch_add(step, Ordering::AcqRel)
    }
}

impl CounterBackend for ManualCounter {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn read_counter(&self) -> u64 {
        self.tick()
    }

    fn read_counter_serialized(&self) -> (u64, u32) {
        (self.tick(), self.core.load(Ordering::Acquire))
    }

    fn serialize_execution(&self) {}
}
