use log::{debug, warn};
use raw_cpuid::CpuId;
use std::io::BufRead;

const MHZ_TO_HZ: u64 = 1_000_000;

/// Discover the nominal CPU frequency in Hz
///
/// Tries CPUID first and falls back to a single OS source. Returns 0 when
/// neither yields a positive value.
pub fn discover() -> u64 {
    discover_from(cpuid_base_frequency(), os_frequency)
}

/// Pick the first positive frequency, consulting `os` only when `cpuid` is empty
pub fn discover_from(cpuid: Option<u64>, os: impl FnOnce() -> Option<u64>) -> u64 {
    if let Some(hz) = cpuid.filter(|&hz| hz > 0) {
        debug!("CPU frequency from CPUID leaf 0x16: {} Hz", hz);
        return hz;
    }

    match os().filter(|&hz| hz > 0) {
        Some(hz) => {
            debug!("CPU frequency from OS: {} Hz", hz);
            hz
        }
        None => {
            warn!("No source reported a CPU frequency");
            0
        }
    }
}

/// Processor base frequency from CPUID leaf 0x16
///
/// Only present on Skylake and later Intel parts.
pub fn cpuid_base_frequency() -> Option<u64> {
    CpuId::new()
        .get_processor_frequency_info()
        .map(|info| info.processor_base_frequency())
        .filter(|&mhz| mhz > 0)
        .map(|mhz| u64::from(mhz) * MHZ_TO_HZ)
}

/// Frequency reported by the operating system
#[cfg(target_os = "linux")]
pub fn os_frequency() -> Option<u64> {
    let file = std::fs::File::open("/proc/cpuinfo")
        .inspect_err(|e| debug!("Cannot open /proc/cpuinfo: {}", e))
        .ok()?;

    parse_cpuinfo_mhz(std::io::BufReader::new(file)).and_then(mhz_to_hz)
}

/// Frequency reported by the operating system
#[cfg(target_os = "macos")]
pub fn os_frequency() -> Option<u64> {
    let mut freq: u64 = 0;
    let mut len = std::mem::size_of::<u64>();

    // SAFETY: `freq` and `len` outlive the call and `len` matches the buffer.
    let rc = unsafe {
        libc::sysctlbyname(
            c"hw.cpufrequency_max".as_ptr(),
            (&mut freq as *mut u64).cast(),
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };

    if rc != 0 {
        debug!(
            "sysctl hw.cpufrequency_max failed: {}",
            std::io::Error::last_os_error()
        );
        return None;
    }

    (freq > 0).then_some(freq)
}

/// Frequency reported by the operating system
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn os_frequency() -> Option<u64> {
    None
}

/// Find the first `cpu MHz : <value>` entry in `/proc/cpuinfo`-style text
///
/// Lines that do not parse are skipped. Returns the value in MHz.
pub fn parse_cpuinfo_mhz<R: BufRead>(reader: R) -> Option<f64> {
    reader
        .lines()
        .map_while(Result::ok)
        .find_map(|line| parse_mhz_line(&line))
}

fn parse_mhz_line(line: &str) -> Option<f64> {
    let value = line
        .strip_prefix("cpu MHz")?
        .trim_start()
        .strip_prefix(':')?
        .trim();

    value.parse::<f64>().ok()
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn mhz_to_hz(mhz: f64) -> Option<u64> {
    let hz = mhz * MHZ_TO_HZ as f64;
    (hz.is_finite() && hz >= 1.0).then_some(hz as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) CPU @ 2.20GHz
cpu MHz\t\t: 2200.152
cache size\t: 56320 KB
processor\t: 1
cpu MHz\t\t: 2199.998
";

    #[test]
    fn test_parse_first_match() {
        let mhz = parse_cpuinfo_mhz(Cursor::new(CPUINFO)).unwrap();
        assert_eq!(mhz, 2200.152);
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let text = "cpu MHz : unknown\ncpu MHz : 3400.5\n";
        assert_eq!(parse_cpuinfo_mhz(Cursor::new(text)), Some(3400.5));
    }

    #[test]
    fn test_parse_missing_field() {
        let text = "processor : 0\nflags : fpu vme de\n";
        assert_eq!(parse_cpuinfo_mhz(Cursor::new(text)), None);
        assert_eq!(parse_cpuinfo_mhz(Cursor::new("")), None);
    }

    #[test]
    fn test_mhz_to_hz() {
        assert_eq!(mhz_to_hz(2000.0), Some(2_000_000_000));
        assert_eq!(mhz_to_hz(0.0), None);
        assert_eq!(mhz_to_hz(-5.0), None);
        assert_eq!(mhz_to_hz(f64::NAN), None);
    }

    #[test]
    fn test_cpuid_wins_without_asking_os() {
        let hz = discover_from(Some(2_400_000_000), || {
            panic!("OS source consulted despite a CPUID frequency")
        });

        assert_eq!(hz, 2_400_000_000);
    }

    #[test]
    fn test_os_fallback_when_cpuid_empty() {
        assert_eq!(discover_from(None, || Some(3_100_000_000)), 3_100_000_000);
        assert_eq!(discover_from(Some(0), || Some(1_800_000_000)), 1_800_000_000);
    }

    #[test]
    fn test_no_source_yields_zero() {
        assert_eq!(discover_from(None, || None), 0);
        assert_eq!(discover_from(None, || Some(0)), 0);
    }

    #[test]
    fn test_discover_never_panics() {
        let hz = discover();
        println!("Discovered CPU frequency: {} Hz", hz);
    }
}
