//! # Sleep-Mode Arbiter
//!
//! Lets independent subsystems veto deep sleep without coordinating with
//! each other. Each subsystem requests the deepest mode it can tolerate
//! (for example a UART that is receiving requests `NONE`) and releases the
//! request when done. The arbiter sleeps no deeper than the shallowest mode
//! that still has an outstanding request.
//!
//! ```text
//!   mode:     0 (NONE)   1          2 (DEEPEST)
//!   count:    [ 0 ]      [ 2 ]      [ 1 ]      -> deepest allowed = 1
//! ```

use core::cell::Cell;
use core::fmt;

use crate::config::{SLEEP_MODES, SLEEP_REQUEST_MAX};
use crate::sync::{self, Mutex};

/// A power state, `0` (no sleep) being the shallowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SleepMode(pub u8);

impl SleepMode {
    /// Stay awake; the CPU busy-waits for events.
    pub const NONE: SleepMode = SleepMode(0);
    /// Core clock gated, peripherals running (`wfi`).
    pub const LIGHT: SleepMode = SleepMode(1);
    /// Deepest mode the target supports.
    pub const DEEPEST: SleepMode = SleepMode(SLEEP_MODES as u8 - 1);

    #[inline]
    fn index(self) -> Option<usize> {
        let index = self.0 as usize;
        (index < SLEEP_MODES).then_some(index)
    }
}

impl fmt::Display for SleepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sleep mode {}", self.0)
    }
}

/// Reference-counted sleep-mode vetoes.
///
/// Counters live behind the interrupt mask so that requests may also come
/// from interrupt handlers.
pub struct SleepArbiter {
    counts: Mutex<Cell<[u16; SLEEP_MODES]>>,
}

impl SleepArbiter {
    pub const fn new() -> Self {
        Self {
            counts: Mutex::new(Cell::new([0; SLEEP_MODES])),
        }
    }

    /// Zero every request counter.
    pub fn reset(&self) {
        sync::critical_section(|cs| self.counts.borrow(cs).set([0; SLEEP_MODES]));
    }

    /// Add one request for `mode`. Saturates at `SLEEP_REQUEST_MAX`;
    /// unknown modes are ignored.
    pub fn request(&self, mode: SleepMode) {
        let Some(index) = mode.index() else {
            return;
        };
        sync::critical_section(|cs| {
            let cell = self.counts.borrow(cs);
            let mut counts = cell.get();
            if counts[index] < SLEEP_REQUEST_MAX {
                counts[index] += 1;
                cell.set(counts);
            }
        });
    }

    /// Drop one request for `mode`. Floors at zero; unknown modes are ignored.
    pub fn release(&self, mode: SleepMode) {
        let Some(index) = mode.index() else {
            return;
        };
        sync::critical_section(|cs| {
            let cell = self.counts.borrow(cs);
            let mut counts = cell.get();
            counts[index] = counts[index].saturating_sub(1);
            cell.set(counts);
        });
    }

    /// Outstanding requests for `mode` (0 for unknown modes).
    pub fn requests(&self, mode: SleepMode) -> u16 {
        match mode.index() {
            Some(index) => sync::critical_section(|cs| self.counts.borrow(cs).get()[index]),
            None => 0,
        }
    }

    /// The shallowest mode with an outstanding request, or the deepest
    /// mode when nobody objects.
    pub fn deepest_allowed_mode(&self) -> SleepMode {
        let counts = sync::critical_section(|cs| self.counts.borrow(cs).get());
        counts
            .iter()
            .position(|&count| count > 0)
            .map_or(SleepMode::DEEPEST, |index| SleepMode(index as u8))
    }
}

impl Default for SleepArbiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Put the processor into `mode` until the next interrupt.
///
/// `NONE` returns immediately after a spin hint; the caller re-checks its
/// wake condition in a loop.
pub fn enter(mode: SleepMode) {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    {
        use crate::arch::cortex_m4;
        match mode.0 {
            0 => core::hint::spin_loop(),
            1 => cortex_m4::wait_for_interrupt(),
            _ => cortex_m4::deep_sleep(),
        }
    }

    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    {
        let _ = mode;
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_requests_allows_deepest() {
        let arbiter = SleepArbiter::new();
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode::DEEPEST);
    }

    #[test]
    fn test_no_sleep_request_wins() {
        let arbiter = SleepArbiter::new();
        arbiter.request(SleepMode(2));
        arbiter.request(SleepMode(1));
        arbiter.request(SleepMode::NONE);
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode::NONE);

        arbiter.release(SleepMode::NONE);
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode(1));

        arbiter.release(SleepMode(1));
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode(2));
    }

    #[test]
    fn test_requests_are_reference_counted() {
        let arbiter = SleepArbiter::new();
        arbiter.request(SleepMode::LIGHT);
        arbiter.request(SleepMode::LIGHT);
        arbiter.release(SleepMode::LIGHT);
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode::LIGHT);
        arbiter.release(SleepMode::LIGHT);
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode::DEEPEST);
    }

    #[test]
    fn test_release_floors_at_zero() {
        let arbiter = SleepArbiter::new();
        arbiter.release(SleepMode::NONE);
        assert_eq!(arbiter.requests(SleepMode::NONE), 0);
        arbiter.request(SleepMode::NONE);
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode::NONE);
    }

    #[test]
    fn test_request_saturates() {
        let arbiter = SleepArbiter::new();
        for _ in 0..(SLEEP_REQUEST_MAX + 10) {
            arbiter.request(SleepMode::NONE);
        }
        assert_eq!(arbiter.requests(SleepMode::NONE), SLEEP_REQUEST_MAX);
        for _ in 0..SLEEP_REQUEST_MAX {
            arbiter.release(SleepMode::NONE);
        }
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode::DEEPEST);
    }

    #[test]
    fn test_unknown_mode_ignored() {
        let arbiter = SleepArbiter::new();
        arbiter.request(SleepMode(SLEEP_MODES as u8));
        arbiter.release(SleepMode(200));
        assert_eq!(arbiter.requests(SleepMode(200)), 0);
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode::DEEPEST);
    }

    #[test]
    fn test_reset() {
        let arbiter = SleepArbiter::new();
        arbiter.request(SleepMode::NONE);
        arbiter.reset();
        assert_eq!(arbiter.deepest_allowed_mode(), SleepMode::DEEPEST);
    }
}
