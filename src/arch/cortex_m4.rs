//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! SysTick configuration for the scheduler tick and sleep entry for the
//! sleep-mode arbiter.
//!
//! ## Sleep Modes
//!
//! | Mode | Instruction               | Wakes on          |
//! |------|---------------------------|-------------------|
//! | 0    | none (busy-wait)          | —                 |
//! | 1    | `wfi`                     | any interrupt     |
//! | 2    | `wfi` with SCR.SLEEPDEEP  | enabled wake-up sources |
//!
//! What "deep" means (STOP, standby, ...) is vendor-specific and chosen by
//! the power controller configuration done elsewhere.
//!
//! ## Sleeping Without Losing Wake-ups
//!
//! Callers enter these functions with PRIMASK set, after checking their
//! wake condition inside the same critical section:
//!
//! ```text
//!   cpsid i
//!   queue empty? ── no ──► cpsie i, return
//!   wfi                    ← returns on any pending interrupt, masked or not
//!   cpsie i                ← the pending handler runs here
//!   re-check
//! ```
//!
//! An interrupt arriving between the check and `wfi` stays pending and
//! makes `wfi` return at once instead of being consumed before the sleep.

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

/// System Control Register.
const SCR: *mut u32 = 0xE000_ED10 as *mut u32;
/// SCR.SLEEPDEEP
const SCR_SLEEPDEEP: u32 = 1 << 2;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the scheduler tick.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock. The application's `SysTick` exception handler must call
/// `Shared::tick()`.
///
/// # Parameters
/// - `syst`: Mutable reference to the SysTick peripheral
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Sleep entry
// ---------------------------------------------------------------------------

/// Sleep until the next interrupt with the core clock gated.
///
/// Also returns when an interrupt is already pending, including one held
/// off by PRIMASK.
#[inline]
pub fn wait_for_interrupt() {
    set_sleepdeep(false);
    cortex_m::asm::wfi();
}

/// Enter the deep sleep state until a wake-up interrupt.
///
/// SLEEPDEEP is cleared again on wake-up so that a later `wfi` from
/// elsewhere does not unexpectedly enter deep sleep.
#[inline]
pub fn deep_sleep() {
    set_sleepdeep(true);
    cortex_m::asm::dsb();
    cortex_m::asm::wfi();
    set_sleepdeep(false);
}

fn set_sleepdeep(deep: bool) {
    // SCR is only written from the foreground loop.
    unsafe {
        let val = core::ptr::read_volatile(SCR);
        let val = if deep {
            val | SCR_SLEEPDEEP
        } else {
            val & !SCR_SLEEPDEEP
        };
        core::ptr::write_volatile(SCR, val);
    }
}
