//! Hardware time-stamp counter

use super::CounterBackend;
use crate::probe;
use std::sync::atomic::{Ordering, compiler_fence};

#[cfg(target_arch = "x86")]
use std::arch::x86 as arch;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64 as arch;

/// Linux stores the CPU number in the low 12 bits of IA32_TSC_AUX
/// and the NUMA node above them.
#[cfg(target_os = "linux")]
const TSC_AUX_CPU_MASK: u32 = 0xfff;

/// x86 time-stamp counter read through `cpuid` / `rdtsc` / `rdtscp`
///
/// `cpuid` is the serializing barrier, `rdtsc` opens a window and `rdtscp`
/// closes it. Only construct timers on this backend after
/// [`Tsc::is_supported`] returned `true`; executing `rdtscp` on a processor
/// without it raises an invalid-opcode fault.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tsc;

impl CounterBackend for Tsc {
    fn name(&self) -> &'static str {
        "rdtscp"
    }

    fn is_supported(&self) -> bool {
        probe::has_rdtscp()
    }

    fn reports_os_core(&self) -> bool {
        true
    }

    #[inline(always)]
    #[allow(unused_unsafe)]
    fn read_counter(&self) -> u64 {
        compiler_fence(Ordering::SeqCst);
        // SAFETY: rdtsc is part of every x86 processor this crate builds for.
        let cycles = unsafe { arch::_rdtsc() };
        compiler_fence(Ordering::SeqCst);
        cycles
    }

    #[inline(always)]
    #[allow(unused_unsafe)]
    fn read_counter_serialized(&self) -> (u64, u32) {
        let mut aux = 0u32;
        compiler_fence(Ordering::SeqCst);
        // SAFETY: only reachable once RDTSCP support has been confirmed.
        let cycles = unsafe { arch::__rdtscp(&mut aux) };
        compiler_fence(Ordering::SeqCst);
        (cycles, aux)
    }

    #[inline(always)]
    #[allow(unused_unsafe)]
    fn serialize_execution(&self) {
        compiler_fence(Ordering::SeqCst);
        // SAFETY: cpuid leaf 0 exists on every x86 processor.
        let _ = unsafe { arch::__cpuid(0) };
        compiler_fence(Ordering::SeqCst);
    }

    #[inline]
    fn current_core(&self) -> u32 {
        let (_, aux) = self.read_counter_serialized();

        #[cfg(target_os = "linux")]
        {
            aux & TSC_AUX_CPU_MASK
        }

        #[cfg(not(target_os = "linux"))]
        {
            aux
        }
    }
}
