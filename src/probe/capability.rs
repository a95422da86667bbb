use raw_cpuid::CpuId;

/// Whether the processor implements `rdtscp`
///
/// CPUID 0x8000_0001, EDX bit 27. Without it the timer refuses to run
/// rather than fall back to plain `rdtsc`, which can be reordered around
/// the timed code.
pub fn has_rdtscp() -> bool {
    CpuId::new()
        .get_extended_processor_and_feature_identifiers()
        .is_some_and(|epf| epf.has_rdtscp())
}

/// Whether the counter ticks at a constant rate across P-/C-states
///
/// CPUID 0x8000_0007, EDX bit 8.
pub fn has_invariant_tsc() -> bool {
    CpuId::new()
        .get_advanced_power_mgmt_info()
        .is_some_and(|apm| apm.has_invariant_tsc())
}
