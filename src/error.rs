//! # Errors
//!
//! Every failure in the scheduler core is reported to the caller and is
//! locally recoverable; nothing here panics.

use core::fmt;

use crate::task::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The event queue has no free slot. The rejected event is not stored.
    QueueFull,
    /// The timer list has no free slot.
    TimerListFull,
    /// The task table is full (`MAX_TASKS` reached).
    TaskTableFull,
    /// Timeout of zero, or longer than `MAX_TIMEOUT`.
    InvalidTimeout,
    /// No task with this pid is registered.
    UnknownPid(Pid),
    /// The task is already `Active` or `Running`.
    AlreadyStarted(Pid),
    /// The task is `Inactive`; the event addressed to it was consumed and dropped.
    NotStarted(Pid),
    /// Operation exists for API completeness but is not supported.
    Unimplemented,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QueueFull => write!(f, "event queue full"),
            Error::TimerListFull => write!(f, "timer list full"),
            Error::TaskTableFull => write!(f, "task table full"),
            Error::InvalidTimeout => write!(f, "invalid timeout"),
            Error::UnknownPid(pid) => write!(f, "no task with pid {}", pid),
            Error::AlreadyStarted(pid) => write!(f, "task {} already started", pid),
            Error::NotStarted(pid) => write!(f, "task {} not started", pid),
            Error::Unimplemented => write!(f, "operation not implemented"),
        }
    }
}

impl core::error::Error for Error {}
