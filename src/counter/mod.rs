//! Cycle counter backends
//!
//! A backend exposes the three primitives the timer is built from: a plain
//! counter read, a serializing read that also reports the executing core, and
//! a full execution barrier. The stamp protocol on top of them is fixed:
//!
//! ```text
//! start: serialize -> read
//! end:   serialized read -> serialize
//! ```
//!
//! The leading barrier keeps earlier instructions out of the window; the
//! serializing end read waits for the timed work, and the trailing barrier
//! keeps later instructions from being hoisted above it.

mod manual;
mod tsc;

pub use manual::ManualCounter;
pub use tsc::Tsc;

/// Source of monotonically increasing cycle counts
pub trait CounterBackend: Send + Sync {
    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Whether the serializing read is available on this machine
    fn is_supported(&self) -> bool;

    /// Read the counter without any ordering guarantee
    fn read_counter(&self) -> u64;

    /// Read the counter after all preceding instructions have retired
    ///
    /// Returns the count and the raw core identifier reported alongside it.
    fn read_counter_serialized(&self) -> (u64, u32);

    /// Full execution barrier
    fn serialize_execution(&self);

    /// Whether [`current_core`](Self::current_core) names a core the OS can pin to
    ///
    /// Simulated backends report made-up cores and keep the default.
    fn reports_os_core(&self) -> bool {
        false
    }

    /// Core the calling thread is executing on
    #[inline]
    fn current_core(&self) -> u32 {
        self.read_counter_serialized().1
    }

    /// Opening stamp of a measurement window
    #[inline(always)]
    fn start_stamp(&self) -> u64 {
        self.serialize_execution();
        self.read_counter()
    }

    /// Closing stamp of a measurement window
    #[inline(always)]
    fn end_stamp(&self) -> u64 {
        let (cycles, _) = self.read_counter_serialized();
        self.serialize_execution();
        cycles
    }
}
