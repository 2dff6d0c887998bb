//! # Scheduler
//!
//! Task registry and event dispatcher for EvOS.
//!
//! The scheduler owns a fixed table of Task Control Blocks, hands out pids
//! and drives each task's state machine. It does not own the event queue:
//! the kernel pops events and passes them to [`Scheduler::dispatch`] one at
//! a time.
//!
//! ## Dispatch rules
//!
//! 1. The event's pid must name a registered task, else it is dropped
//! 2. The task must have been started (`Active`), else it is dropped
//! 3. The task is marked `Running` and its handler runs to completion
//! 4. `Flow::Continue` returns the task to `Active`, `Flow::Done` to `Inactive`
//!
//! The idle task is kept outside the table under pid 0 and is never reached
//! through the event queue.

use log::{debug, trace};

use crate::config::MAX_TASKS;
use crate::error::Error;
use crate::event::Event;
use crate::kernel::Context;
use crate::task::{Flow, Handler, Pid, TaskControlBlock, TaskState};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The task registry.
///
/// ## Design Notes
///
/// - All tasks are stored inline in a fixed-size array (no heap)
/// - Pids come from a counter that only moves forward, so a pid is never
///   reused within a run even though slots are reusable in principle
/// - The idle task lives in its own slot
pub struct Scheduler<'a> {
    /// Fixed-size array of TCBs, filled from the front.
    pub tasks: [TaskControlBlock<'a>; MAX_TASKS],

    /// Number of allocated slots in `tasks`.
    pub task_count: usize,

    /// Last pid handed out; `0` before the first registration.
    last_pid: u8,

    /// The idle task, run whenever the event queue is empty.
    idle: TaskControlBlock<'a>,
}

impl<'a> Scheduler<'a> {
    pub const fn new() -> Self {
        Self {
            tasks: [const { TaskControlBlock::EMPTY }; MAX_TASKS],
            task_count: 0,
            last_pid: 0,
            idle: TaskControlBlock::EMPTY,
        }
    }

    /// Forget every registered task, including the idle task.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Register a new task in state `Inactive`.
    ///
    /// # Returns
    /// - `Ok(pid)` — the next pid, starting at 1 and strictly increasing
    /// - `Err(TaskTableFull)` — `MAX_TASKS` reached
    pub fn add_task(&mut self, handler: &'a mut dyn Handler, name: &'static str) -> Result<Pid, Error> {
        let slot = self
            .tasks
            .iter()
            .position(|tcb| !tcb.is_allocated())
            .ok_or(Error::TaskTableFull)?;

        // MAX_TASKS < u8::MAX is checked at build time, and only this
        // function advances the counter, so it cannot wrap.
        self.last_pid += 1;
        let pid = Pid(self.last_pid);
        self.tasks[slot].init(pid, name, handler);
        self.task_count += 1;

        debug!("add task \"{}\", pid {}", name, pid);
        Ok(pid)
    }

    /// Install the idle task under pid 0, replacing any previous one.
    pub fn add_idle_task(&mut self, handler: &'a mut dyn Handler, name: &'static str) {
        self.idle.init(Pid::IDLE, name, handler);
        debug!("add idle task \"{}\"", name);
    }

    pub fn has_idle_task(&self) -> bool {
        self.idle.is_allocated()
    }

    /// Move a task from `Inactive` to `Active`.
    ///
    /// Queuing the START event is the caller's job; see `Kernel::start_task`.
    pub fn start(&mut self, pid: Pid) -> Result<(), Error> {
        let tcb = self.find_mut(pid).ok_or(Error::UnknownPid(pid))?;
        if tcb.state != TaskState::Inactive {
            return Err(Error::AlreadyStarted(pid));
        }
        tcb.state = TaskState::Active;
        debug!("start task \"{}\", pid {}", tcb.name, pid);
        Ok(())
    }

    /// Undo a `start` whose START event could not be queued.
    pub(crate) fn cancel_start(&mut self, pid: Pid) {
        if let Some(tcb) = self.find_mut(pid) {
            if tcb.state == TaskState::Active {
                tcb.state = TaskState::Inactive;
            }
        }
    }

    /// Not supported: a started task runs until its handler returns
    /// `Flow::Done`.
    pub fn stop(&mut self, _pid: Pid) -> Result<(), Error> {
        Err(Error::Unimplemented)
    }

    /// Not supported: registered tasks stay in the table for the whole run.
    pub fn remove(&mut self, _pid: Pid) -> Result<(), Error> {
        Err(Error::Unimplemented)
    }

    pub fn find(&self, pid: Pid) -> Option<&TaskControlBlock<'a>> {
        self.tasks
            .iter()
            .find(|tcb| tcb.is_allocated() && tcb.pid == pid)
    }

    pub fn find_mut(&mut self, pid: Pid) -> Option<&mut TaskControlBlock<'a>> {
        self.tasks
            .iter_mut()
            .find(|tcb| tcb.is_allocated() && tcb.pid == pid)
    }

    pub fn state(&self, pid: Pid) -> Option<TaskState> {
        self.find(pid).map(|tcb| tcb.state)
    }

    /// Deliver one event to its task.
    ///
    /// # Errors
    /// - `UnknownPid` — no registered task has this pid
    /// - `NotStarted` — the task is `Inactive`
    ///
    /// In both cases the event has been consumed and is gone.
    pub fn dispatch(&mut self, cx: &Context<'_>, event: Event) -> Result<(), Error> {
        let pid = event.pid;
        let tcb = self.find_mut(pid).ok_or(Error::UnknownPid(pid))?;
        if tcb.state == TaskState::Inactive {
            return Err(Error::NotStarted(pid));
        }

        trace!("execute \"{}\": {}", tcb.name, event);
        match tcb.invoke(&cx.for_task(pid), event.code, event.data) {
            Some(Flow::Done) => debug!("task \"{}\" (pid {}) finished", tcb.name, pid),
            Some(Flow::Continue) => {}
            None => return Err(Error::UnknownPid(pid)),
        }
        Ok(())
    }

    /// Run the idle task once with event code 0 and no data.
    ///
    /// Returns `None` when no idle task is installed.
    pub fn run_idle(&mut self, cx: &Context<'_>) -> Option<Flow> {
        self.idle.invoke(&cx.for_task(Pid::IDLE), 0, None)
    }
}

impl Default for Scheduler<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventCode, EventData, START};
    use crate::kernel::Shared;
    use crate::sleep::SleepArbiter;

    #[derive(Default)]
    struct Recorder {
        calls: u32,
        last: EventCode,
        finish_on: Option<EventCode>,
    }

    impl Handler for Recorder {
        fn handle(&mut self, _cx: &Context<'_>, code: EventCode, _data: EventData) -> Flow {
            self.calls += 1;
            self.last = code;
            if self.finish_on == Some(code) {
                Flow::Done
            } else {
                Flow::Continue
            }
        }
    }

    #[test]
    fn test_pids_are_sequential_and_nonzero() {
        let mut recorders: [Recorder; 4] = Default::default();
        let mut scheduler = Scheduler::new();
        let mut last = Pid::IDLE;
        for recorder in recorders.iter_mut() {
            let pid = scheduler.add_task(recorder, "recorder").unwrap();
            assert!(!pid.is_idle());
            assert!(pid > last);
            last = pid;
        }
        assert_eq!(last, Pid(4));
        assert_eq!(scheduler.task_count, 4);
    }

    #[test]
    fn test_table_full() {
        let mut recorders: [Recorder; MAX_TASKS + 1] = Default::default();
        let (fits, extra) = recorders.split_at_mut(MAX_TASKS);
        let mut scheduler = Scheduler::new();
        for recorder in fits.iter_mut() {
            scheduler.add_task(recorder, "recorder").unwrap();
        }
        assert_eq!(
            scheduler.add_task(&mut extra[0], "extra"),
            Err(Error::TaskTableFull)
        );
    }

    #[test]
    fn test_start_rules() {
        let mut recorder = Recorder::default();
        let mut scheduler = Scheduler::new();
        let pid = scheduler.add_task(&mut recorder, "recorder").unwrap();

        assert_eq!(scheduler.start(Pid(9)), Err(Error::UnknownPid(Pid(9))));
        assert_eq!(scheduler.start(pid), Ok(()));
        assert_eq!(scheduler.state(pid), Some(TaskState::Active));
        assert_eq!(scheduler.start(pid), Err(Error::AlreadyStarted(pid)));
    }

    #[test]
    fn test_dispatch_state_machine() {
        let shared = Shared::new();
        let sleep = SleepArbiter::new();
        let cx = Context::new(&shared, &sleep);

        let mut recorder = Recorder {
            finish_on: Some(3),
            ..Default::default()
        };
        let mut scheduler = Scheduler::new();
        let pid = scheduler.add_task(&mut recorder, "recorder").unwrap();

        // Never started: dropped.
        assert_eq!(
            scheduler.dispatch(&cx, Event::new(pid, 1, None)),
            Err(Error::NotStarted(pid))
        );

        scheduler.start(pid).unwrap();
        assert_eq!(scheduler.dispatch(&cx, Event::new(pid, START, None)), Ok(()));
        assert_eq!(scheduler.state(pid), Some(TaskState::Active));

        assert_eq!(scheduler.dispatch(&cx, Event::new(pid, 3, None)), Ok(()));
        assert_eq!(scheduler.state(pid), Some(TaskState::Inactive));
        assert_eq!(
            scheduler.dispatch(&cx, Event::new(pid, 4, None)),
            Err(Error::NotStarted(pid))
        );

        // Restart is allowed after finishing.
        assert_eq!(scheduler.start(pid), Ok(()));
        drop(scheduler);
        assert_eq!(recorder.calls, 2);
        assert_eq!(recorder.last, 3);
    }

    #[test]
    fn test_dispatch_unknown_pid() {
        let shared = Shared::new();
        let sleep = SleepArbiter::new();
        let cx = Context::new(&shared, &sleep);

        let mut idle = Recorder::default();
        let mut scheduler = Scheduler::new();
        scheduler.add_idle_task(&mut idle, "idle");

        // The idle task is not reachable through events.
        assert_eq!(
            scheduler.dispatch(&cx, Event::new(Pid::IDLE, 1, None)),
            Err(Error::UnknownPid(Pid::IDLE))
        );
        assert_eq!(scheduler.run_idle(&cx), Some(Flow::Continue));
    }

    #[test]
    fn test_stop_and_remove_unimplemented() {
        let mut recorder = Recorder::default();
        let mut scheduler = Scheduler::new();
        let pid = scheduler.add_task(&mut recorder, "recorder").unwrap();
        scheduler.start(pid).unwrap();

        assert_eq!(scheduler.stop(pid), Err(Error::Unimplemented));
        assert_eq!(scheduler.remove(pid), Err(Error::Unimplemented));
        assert_eq!(scheduler.state(pid), Some(TaskState::Active));
    }

    #[test]
    fn test_cancel_start() {
        let mut recorder = Recorder::default();
        let mut scheduler = Scheduler::new();
        let pid = scheduler.add_task(&mut recorder, "recorder").unwrap();
        scheduler.start(pid).unwrap();
        scheduler.cancel_start(pid);
        assert_eq!(scheduler.state(pid), Some(TaskState::Inactive));
    }
}
