//! Best-effort conversion between cycle counts and wall time.
//!
//! Journal timestamps are raw cycle counts. Turning them into durations
//! needs the counter frequency, which the kernel exposes in a handful of
//! places of varying reliability. None of this is needed for recording.

use lazy_static::lazy_static;
use std::fs;
use std::time::Duration;
use tracing::{debug, warn};

/// Returned by the probe when no frequency source could be read.
pub const CYCLES_PER_SECOND_UNKNOWN: f64 = -1.0;

const TSC_FREQ_KHZ: &str = "/sys/devices/system/cpu/cpu0/tsc_freq_khz";
const CPUINFO_MAX_FREQ: &str = "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq";
const PROC_CPUINFO: &str = "/proc/cpuinfo";

lazy_static! {
    /// Probed once per process; the frequency sources do not change at runtime.
    static ref CYCLES_PER_SECOND: f64 = probe_cycles_per_second();
}

/// Returns the cached cycle-counter frequency in Hz, or
/// [`CYCLES_PER_SECOND_UNKNOWN`] if it could not be determined.
pub fn cycles_per_second() -> f64 {
    *CYCLES_PER_SECOND
}

/// Probes the platform for the cycle-counter frequency in Hz.
///
/// Sources are tried in order:
///
/// 1. `tsc_freq_khz`, exported by kernels that know the TSC rate
/// 2. `cpuinfo_max_freq`, the maximum frequency when CPU scaling is active
/// 3. `/proc/cpuinfo`, the first positive `cpu MHz`, else `bogomips`
///
/// Returns [`CYCLES_PER_SECOND_UNKNOWN`] when every source fails.
pub fn probe_cycles_per_second() -> f64 {
    for path in [TSC_FREQ_KHZ, CPUINFO_MAX_FREQ] {
        if let Some(hz) = fs::read_to_string(path).ok().as_deref().and_then(parse_khz) {
            debug!(path, hz, "cycle frequency from sysfs");
            return hz;
        }
    }

    match fs::read_to_string(PROC_CPUINFO) {
        Ok(text) => parse_cpuinfo(&text).unwrap_or_else(|| {
            warn!("no usable frequency in {}", PROC_CPUINFO);
            CYCLES_PER_SECOND_UNKNOWN
        }),
        Err(err) => {
            warn!(%err, "failed to open {}", PROC_CPUINFO);
            CYCLES_PER_SECOND_UNKNOWN
        }
    }
}

/// Parses a sysfs frequency file (value in kHz) into Hz.
pub fn parse_khz(text: &str) -> Option<f64> {
    let khz: f64 = text.trim().parse().ok()?;
    (khz > 0.0).then(|| khz * 1000.0)
}

/// Extracts a frequency in Hz from the contents of `/proc/cpuinfo`.
///
/// The first positive `cpu MHz` value wins. Virtual machines sometimes
/// report zero there, in which case the last non-negative `bogomips` is
/// used instead.
pub fn parse_cpuinfo(text: &str) -> Option<f64> {
    let mut bogo_clock = None;

    for line in text.lines().filter(|l| !l.is_empty()) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let Ok(value) = value.trim().parse::<f64>() else {
            continue;
        };

        if key.starts_with("cpu mhz") {
            let hz = value * 1_000_000.0;
            if hz > 0.0 {
                return Some(hz);
            }
        } else if key.starts_with("bogomips") {
            let hz = value * 1_000_000.0;
            bogo_clock = (hz >= 0.0).then_some(hz);
        }
    }

    bogo_clock
}

/// Converts a cycle delta into wall time given a frequency in Hz.
///
/// Returns `None` for a non-positive frequency, including
/// [`CYCLES_PER_SECOND_UNKNOWN`].
pub fn cycles_to_duration(cycles: u64, cycles_per_second: f64) -> Option<Duration> {
    if cycles_per_second <= 0.0 || !cycles_per_second.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(cycles as f64 / cycles_per_second))
}
