//! # EvOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All capacities are fixed at compile time — no dynamic allocation.

/// Maximum number of tasks the registry can hold, not counting the idle
/// task. Pids are 8-bit and never reused, so this also bounds the pid space.
pub const MAX_TASKS: usize = 16;

/// Number of slots in the event queue. Producers (ISRs and handlers) get
/// `Error::QueueFull` once this many events are waiting for dispatch.
pub const EVENT_QUEUE_SIZE: usize = 8;

/// Number of pending one-shot timer events.
pub const TIMER_LIST_SIZE: usize = 8;

/// Number of sleep modes, ordered from shallowest (`0`, no sleep) to
/// deepest (`SLEEP_MODES - 1`).
pub const SLEEP_MODES: usize = 3;

/// Saturation ceiling for outstanding requests on a single sleep mode.
/// Requests beyond this count are silently ignored.
pub const SLEEP_REQUEST_MAX: u16 = 128;

/// Longest accepted timer timeout in ticks. Expiry comparisons treat the
/// 32-bit tick space as a circle, so anything further than half of it
/// away would already look expired.
pub const MAX_TIMEOUT: u32 = i32::MAX as u32;

/// SysTick frequency in Hz. One tick is the unit of every timer timeout.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

// Build-time capacity checks: a malformed table is rejected here rather
// than defended against at runtime.
const _: () = assert!(MAX_TASKS > 0 && MAX_TASKS < u8::MAX as usize);
const _: () = assert!(EVENT_QUEUE_SIZE > 0);
const _: () = assert!(TIMER_LIST_SIZE > 0);
const _: () = assert!(SLEEP_MODES > 0 && SLEEP_MODES <= u8::MAX as usize);
