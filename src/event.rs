//! # Events and the Event Queue
//!
//! An [`Event`] is a `(pid, code, data)` message routed to a task's handler.
//! The [`EventQueue`] carries events from any producer (interrupt handlers,
//! task handlers, the timer list) to the single dispatch loop, in exactly
//! the order they were accepted.
//!
//! ## Event codes
//!
//! | Range   | Meaning                         |
//! |---------|---------------------------------|
//! | 0–127   | Application-defined             |
//! | 128     | [`START`] — sent by `start_task` |
//! | 129     | [`STOP`]                        |
//! | 130     | [`POLL`]                        |

use core::any::Any;
use core::cell::RefCell;
use core::fmt;

use log::{trace, warn};

use crate::config::EVENT_QUEUE_SIZE;
use crate::error::Error;
use crate::queue::BoundedQueue;
use crate::sync::{self, CriticalSection, Mutex};
use crate::task::Pid;

/// Event code, 0–255.
pub type EventCode = u8;

/// Opaque payload attached to an event. Handlers recover the concrete
/// type with `downcast_ref`.
pub type EventData = Option<&'static (dyn Any + Send + Sync)>;

/// First code reserved for the scheduler; everything below is free for
/// application use.
pub const RESERVED_CODES: EventCode = 128;
pub const START: EventCode = 128;
pub const STOP: EventCode = 129;
pub const POLL: EventCode = 130;

/// Whether `code` belongs to the scheduler's reserved range.
#[inline]
pub const fn is_reserved(code: EventCode) -> bool {
    code >= RESERVED_CODES
}

#[derive(Debug, Clone, Copy)]
pub struct Event {
    /// Receiving task. Validated at dispatch time, not when queued.
    pub pid: Pid,
    pub code: EventCode,
    pub data: EventData,
}

impl Event {
    /// Placeholder used to fill unused queue slots.
    pub const EMPTY: Event = Event {
        pid: Pid::IDLE,
        code: 0,
        data: None,
    };

    pub const fn new(pid: Pid, code: EventCode, data: EventData) -> Self {
        Self { pid, code, data }
    }
}

// Payloads compare by address: two events are equal when they carry the
// very same object.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        let same_data = match (self.data, other.data) {
            (None, None) => true,
            (Some(a), Some(b)) => core::ptr::addr_eq(a, b),
            _ => false,
        };
        self.pid == other.pid && self.code == other.code && same_data
    }
}

impl Eq for Event {}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            START => write!(f, "START -> pid {}", self.pid),
            STOP => write!(f, "STOP -> pid {}", self.pid),
            POLL => write!(f, "POLL -> pid {}", self.pid),
            code => write!(f, "event {} -> pid {}", code, self.pid),
        }
    }
}

// ---------------------------------------------------------------------------
// Event queue
// ---------------------------------------------------------------------------

/// Interrupt-safe FIFO of events.
///
/// `send` may be called from any context, including interrupt handlers.
/// `receive` belongs to the dispatch loop. Both run their reserve, copy and
/// commit steps under one interrupt mask.
pub struct EventQueue<const N: usize = EVENT_QUEUE_SIZE> {
    queue: Mutex<RefCell<BoundedQueue<Event, N>>>,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(BoundedQueue::new(Event::EMPTY))),
        }
    }

    /// Append `event` to the tail of the queue.
    ///
    /// Fails only when the queue is full; the pid is not checked here.
    pub fn send(&self, event: Event) -> Result<(), Error> {
        let accepted = sync::critical_section(|cs| self.send_in(cs, event));
        if accepted.is_err() {
            warn!("event queue full, rejected {}", event);
        } else {
            trace!("queued {}", event);
        }
        accepted
    }

    /// `send` for callers already holding the interrupt mask.
    pub(crate) fn send_in(&self, cs: CriticalSection<'_>, event: Event) -> Result<(), Error> {
        self.queue
            .borrow_ref_mut(cs)
            .push(event)
            .map_err(|_| Error::QueueFull)
    }

    /// Take the oldest event, if any.
    pub fn receive(&self) -> Option<Event> {
        sync::critical_section(|cs| self.queue.borrow_ref_mut(cs).pop())
    }

    pub fn is_empty(&self) -> bool {
        sync::critical_section(|cs| self.is_empty_in(cs))
    }

    pub(crate) fn is_empty_in(&self, cs: CriticalSection<'_>) -> bool {
        self.queue.borrow_ref(cs).is_empty()
    }

    pub fn is_full(&self) -> bool {
        sync::critical_section(|cs| self.is_full_in(cs))
    }

    pub(crate) fn is_full_in(&self, cs: CriticalSection<'_>) -> bool {
        self.queue.borrow_ref(cs).is_full()
    }

    pub fn len(&self) -> usize {
        sync::critical_section(|cs| self.queue.borrow_ref(cs).len())
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop every queued event.
    pub fn clear(&self) {
        sync::critical_section(|cs| self.queue.borrow_ref_mut(cs).reset());
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
