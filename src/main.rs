//! Timer diagnostics binary
//!
//! Calibrates the process-wide timer and reports what it found.
//!
//! ```text
//! rdtsc-timer [--json] [--quick] [--no-pin]
//! ```

use anyhow::Context;
use rdtsc_timer::*;
use serde::Serialize;
use std::time::Duration;

const PROBE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Debug, Serialize)]
struct Report {
    backend: &'static str,
    status: TimerStatus,
    cpu_frequency_hz: f64,
    precision_ns: Option<f64>,
    instruction_overhead_cycles: f64,
    confidence_tier: ConfidenceTier,
    error_bound: Option<f64>,
    invariant_tsc: bool,
    affinity_pinning: bool,
    calibration: Option<SampleStats>,
    probe_sleep_secs: Option<f64>,
}

impl Report {
    fn collect(timer: &Timer) -> Self {
        let state = timer.state();

        Self {
            backend: timer.counter().name(),
            status: timer.status(),
            cpu_frequency_hz: state.cpu_frequency_hz(),
            precision_ns: timer.precision().ok(),
            instruction_overhead_cycles: state.instruction_overhead_cycles(),
            confidence_tier: state.confidence_tier(),
            error_bound: timer.error_bound(),
            invariant_tsc: probe::has_invariant_tsc(),
            affinity_pinning: timer.affinity().is_pinning(),
            calibration: timer.calibration().map(|c| c.stats),
            probe_sleep_secs: timer.timed_call(|| std::thread::sleep(PROBE_SLEEP)).ok(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");

    let mut config = if args.iter().any(|a| a == "--quick") {
        TimerConfig::quick()
    } else {
        TimerConfig::default()
    };
    config.pin_affinity = !args.iter().any(|a| a == "--no-pin");

    config.validate().context("invalid timer configuration")?;

    // Degraded timers are still reported, only the configuration can fail
    let timer = match init_with(config) {
        Ok(timer) => timer,
        Err(Error::Config(msg)) => anyhow::bail!("invalid timer configuration: {msg}"),
        Err(e) => {
            log::warn!("{}", e);
            global()
        }
    };

    let report = Report::collect(timer);

    if json {
        let out = serde_json::to_string_pretty(&report).context("serializing report")?;
        println!("{out}");
        return Ok(());
    }

    println!("Timer Report:");
    println!("  Backend:        {}", report.backend);
    println!("  Status:         {}", report.status);
    println!("  CPU Frequency:  {:.0} Hz", report.cpu_frequency_hz);
    match report.precision_ns {
        Some(ns) => println!("  Precision:      {:.4} ns", ns),
        None => println!("  Precision:      n/a"),
    }
    println!("  Overhead:       {:.3} cycles", report.instruction_overhead_cycles);
    println!("  Confidence:     {}", report.confidence_tier);
    println!(
        "  Invariant TSC:  {}",
        if report.invariant_tsc { "yes" } else { "no" }
    );
    println!(
        "  Core Pinning:   {}",
        if report.affinity_pinning {
            "enabled"
        } else {
            "unavailable"
        }
    );

    if let Some(stats) = &report.calibration {
        println!("\n{}", stats);
    }

    if let Some(secs) = report.probe_sleep_secs {
        println!("Probe: sleep({:?}) measured {:.9} s", PROBE_SLEEP, secs);
    }

    Ok(())
}
