//! # Task Control Block
//!
//! Defines the task model for EvOS. A task is an event handler plus the
//! bookkeeping the dispatcher needs to route events to it: a pid, a name
//! and a position in the task state machine.
//!
//! Tasks are cooperative. A handler runs to completion for every event and
//! must not block; it reports through its return value whether it wants
//! further events.

use core::fmt;

use crate::event::{EventCode, EventData};
use crate::kernel::Context;

// ---------------------------------------------------------------------------
// Process identifier
// ---------------------------------------------------------------------------

/// Process identifier. `0` belongs to the idle task; registered tasks are
/// numbered from `1` in registration order and pids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u8);

impl Pid {
    pub const IDLE: Pid = Pid(0);

    #[inline]
    pub const fn is_idle(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task in the dispatcher's state machine.
///
/// ```text
///   ┌──────────┐   start_task()   ┌────────┐    dispatch    ┌─────────┐
///   │ Inactive │ ───────────────► │ Active │ ─────────────► │ Running │
///   └──────────┘                  └────────┘                └─────────┘
///        ▲                             ▲      Flow::Continue     │
///        │                             └─────────────────────────┤
///        │                Flow::Done                             │
///        └───────────────────────────────────────────────────────┘
/// ```
///
/// There is no direct `Inactive -> Running` edge: events for an inactive
/// task are dropped at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Registered but not started, or finished. Not dispatchable.
    Inactive,
    /// Started and waiting for events.
    Active,
    /// Handler is executing.
    Running,
}

/// What a handler wants after processing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep the task `Active`.
    Continue,
    /// Last invocation: the task goes back to `Inactive` until restarted.
    /// From the idle task, asks `Kernel::run` to return.
    Done,
}

/// Application task behaviour.
///
/// `cx` gives the handler access to everything it may touch while it runs:
/// sending events, arming timers, and the sleep-mode arbiter.
pub trait Handler {
    fn handle(&mut self, cx: &Context<'_>, code: EventCode, data: EventData) -> Flow;
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block — one slot in the registry's fixed table.
///
/// A slot without a handler is free.
pub struct TaskControlBlock<'a> {
    pub pid: Pid,
    pub name: &'static str,
    pub state: TaskState,
    handler: Option<&'a mut dyn Handler>,
}

impl<'a> TaskControlBlock<'a> {
    /// An unallocated slot. Used to initialize the static table.
    pub const EMPTY: Self = Self {
        pid: Pid::IDLE,
        name: "",
        state: TaskState::Inactive,
        handler: None,
    };

    /// Occupy this slot with a freshly registered task.
    pub fn init(&mut self, pid: Pid, name: &'static str, handler: &'a mut dyn Handler) {
        self.pid = pid;
        self.name = name;
        self.state = TaskState::Inactive;
        self.handler = Some(handler);
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.handler.is_some()
    }

    /// Run the handler for one event and apply the resulting transition.
    ///
    /// Returns `None` if the slot is free.
    pub fn invoke(&mut self, cx: &Context<'_>, code: EventCode, data: EventData) -> Option<Flow> {
        let handler = self.handler.as_deref_mut()?;
        self.state = TaskState::Running;
        let flow = handler.handle(cx, code, data);
        self.state = match flow {
            Flow::Continue => TaskState::Active,
            Flow::Done => TaskState::Inactive,
        };
        Some(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Shared;
    use crate::sleep::SleepArbiter;

    struct Countdown {
        left: u8,
        seen: u8,
    }

    impl Handler for Countdown {
        fn handle(&mut self, _cx: &Context<'_>, code: EventCode, _data: EventData) -> Flow {
            self.seen = code;
            self.left -= 1;
            if self.left == 0 {
                Flow::Done
            } else {
                Flow::Continue
            }
        }
    }

    #[test]
    fn test_tcb_initialization() {
        let mut handler = Countdown { left: 1, seen: 0 };
        let mut tcb = TaskControlBlock::EMPTY;
        assert!(!tcb.is_allocated());

        tcb.init(Pid(3), "countdown", &mut handler);
        assert!(tcb.is_allocated());
        assert_eq!(tcb.pid, Pid(3));
        assert_eq!(tcb.name, "countdown");
        assert_eq!(tcb.state, TaskState::Inactive);
    }

    #[test]
    fn test_invoke_transitions() {
        let shared = Shared::new();
        let sleep = SleepArbiter::new();
        let cx = Context::new(&shared, &sleep);

        let mut handler = Countdown { left: 2, seen: 0 };
        let mut tcb = TaskControlBlock::EMPTY;
        tcb.init(Pid(1), "countdown", &mut handler);
        tcb.state = TaskState::Active;

        assert_eq!(tcb.invoke(&cx, 7, None), Some(Flow::Continue));
        assert_eq!(tcb.state, TaskState::Active);

        assert_eq!(tcb.invoke(&cx, 8, None), Some(Flow::Done));
        assert_eq!(tcb.state, TaskState::Inactive);
        drop(tcb);
        assert_eq!(handler.seen, 8);
    }

    #[test]
    fn test_invoke_on_free_slot() {
        let shared = Shared::new();
        let sleep = SleepArbiter::new();
        let cx = Context::new(&shared, &sleep);

        let mut tcb = TaskControlBlock::EMPTY;
        assert_eq!(tcb.invoke(&cx, 1, None), None);
        assert_eq!(tcb.state, TaskState::Inactive);
    }

    #[test]
    fn test_pid_idle() {
        assert!(Pid::IDLE.is_idle());
        assert!(!Pid(1).is_idle());
        assert!(Pid(1) < Pid(2));
    }
}
