//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstraction. Every index update on a
//! structure shared with interrupt handlers (the event queue, the timer
//! list, the tick counter) happens inside one of these.
//!
//! The implementation comes from the `critical-section` crate: on the
//! Cortex-M target `cortex-m` provides a single-core PRIMASK mask/restore
//! pair, on the host the `std` implementation backs the unit tests.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts masked).
///
/// Interrupts are masked on entry and the previous mask state is restored
/// on exit, so critical sections nest: an inner section never re-enables
/// interrupts that an outer one still holds masked.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
///
/// Keep critical sections short; nothing that can call back into
/// application code (task handlers, logging) runs inside one.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
