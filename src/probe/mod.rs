//! Hardware and OS probing
//!
//! Everything the timer needs to know about the machine before it can
//! calibrate: the nominal counter frequency and whether the serializing
//! counter read exists.

mod capability;
mod frequency;

pub use capability::{has_invariant_tsc, has_rdtscp};
pub use frequency::{
    cpuid_base_frequency, discover, discover_from, os_frequency, parse_cpuinfo_mhz,
};

/// Source of the nominal counter frequency
pub trait FrequencySource {
    /// Frequency in Hz, or 0 when unknown
    fn discover(&self) -> u64;
}

/// Frequency read from the running machine
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFrequency;

impl FrequencySource for SystemFrequency {
    fn discover(&self) -> u64 {
        discover()
    }
}

/// Fixed, caller-supplied frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFrequency(pub u64);

impl FrequencySource for FixedFrequency {
    fn discover(&self) -> u64 {
        self.0
    }
}
