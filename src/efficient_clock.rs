#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::_rdtsc;

/// Cycle-counter sources for journal timestamps.
///
/// The journal stamps every entry with a raw hardware cycle count. Reading
/// the counter has to stay in the tens of cycles, so the hardware path is a
/// single instruction on the architectures we care about.

/// A monotonic source of cycle counts.
///
/// Implementations must be callable concurrently from any thread and must
/// never go backwards for a single caller.
///
/// # Examples
///
/// ```
/// # use cycle_journal::efficient_clock::{CycleClock, HardwareClock};
/// let clock = HardwareClock;
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b >= a);
/// ```
pub trait CycleClock: Send + Sync {
    /// Returns the current cycle count.
    fn now(&self) -> u64;
}

/// The CPU's own cycle counter.
///
/// This is the clock every journal uses unless a different one is injected
/// with [`EventJournal::with_clock`](crate::EventJournal::with_clock).
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareClock;

impl CycleClock for HardwareClock {
    #[inline(always)]
    fn now(&self) -> u64 {
        read_cycle_counter()
    }
}

impl<F> CycleClock for F
where
    F: Fn() -> u64 + Send + Sync,
{
    #[inline(always)]
    fn now(&self) -> u64 {
        self()
    }
}

/// Returns a monotonic cycle count with the highest precision available.
///
/// This function uses architecture-specific instructions when available:
/// - x86_64: RDTSC instruction (CPU time stamp counter)
/// - aarch64: CNTVCT_EL0 register (ARM virtual counter)
/// - Other platforms: System time with nanosecond precision
///
/// # Performance
///
/// - On x86_64: ~25 CPU cycles
/// - On aarch64: ~10-20 CPU cycles
/// - Other platforms: Varies by OS
#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        _rdtsc()
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        let mut value: u64;
        std::arch::asm!("mrs {}, cntvct_el0", out(reg) value);
        value
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }
}
