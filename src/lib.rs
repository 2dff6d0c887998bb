//! # EvOS — Event-driven Operating System
//!
//! A cooperative, event-driven task scheduler for resource-constrained
//! microcontrollers (ARM Cortex-M4 port included).
//!
//! ## Overview
//!
//! Tasks are event handlers. Interrupt handlers and tasks post events into
//! a fixed-size queue; a single foreground loop pops them one at a time
//! and runs the addressed task's handler to completion. There is no
//! preemption between tasks and no priority: events are handled strictly
//! in the order they were queued.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │          Application Tasks (impl Handler)               │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │  add_task · start_task · send_event · add_timer_event   │
//! │  run · request_mode · release_mode · wait_for_events    │
//! ├──────────────┬──────────────────┬─────────────────────┤
//! │  Scheduler   │  Events/Timers   │  Sleep Arbiter      │
//! │  scheduler.rs│  event.rs        │  sleep.rs           │
//! │  ─ registry  │  timer.rs        │  ─ request()        │
//! │  ─ dispatch()│  ─ send()        │  ─ release()        │
//! │              │  ─ pop_expired() │  ─ deepest_allowed()│
//! ├──────────────┴──────────────────┴─────────────────────┤
//! │      Bounded Queue (queue.rs) · Task Model (task.rs)    │
//! │      two-phase commit         · TCB · TaskState · Pid   │
//! ├────────────────────────────────────────────────────────┤
//! │   Sync (sync.rs) · Arch Port (arch/cortex_m4.rs)        │
//! │   critical sections · SysTick · wfi / SLEEPDEEP         │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Event Flow
//!
//! ```text
//!   ISR / task ──send_event──────────────────► EventQueue ──► dispatch ──► Handler
//!   ISR / task ──add_timer_event──► TimerList ──┘ (promoted once expired)
//!   SysTick ISR ──tick──► Clock
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all capacities are compile-time constants (`config.rs`)
//! - **No `alloc`**: pure `core`
//! - **Interrupt safety**: every index update on state shared with ISRs
//!   runs inside a critical section (`sync.rs`)
//! - **No globals inside the crate**: the application decides where the
//!   [`kernel::Shared`] state lives (normally a `static`) and owns the
//!   [`kernel::Kernel`]

#![no_std]

pub mod config;
pub mod error;
pub mod queue;
pub mod event;
pub mod timer;
pub mod task;
pub mod scheduler;
pub mod sleep;
pub mod kernel;
pub mod sync;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;

pub use error::Error;
pub use event::{Event, EventCode, EventData, POLL, START, STOP};
pub use kernel::{Context, Kernel, Shared};
pub use sleep::SleepMode;
pub use task::{Flow, Handler, Pid, TaskState};
pub use timer::Ticks;
