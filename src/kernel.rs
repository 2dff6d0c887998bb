//! # Kernel
//!
//! Top-level context object and public API for EvOS.
//!
//! State is split by who touches it:
//!
//! - [`Shared`] — the event queue, the timer list and the tick counter.
//!   Interrupt handlers reach these, so `Shared` is `Sync`, has a
//!   `const fn new` and is normally placed in a `static`.
//! - [`Kernel`] — the task registry and the sleep-mode arbiter, owned by
//!   the foreground loop. It borrows a `Shared`.
//! - [`Context`] — what a task handler may touch while it runs.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► Kernel::new(&SHARED)     ← Reset queues, timers, registry
//!         ├─► kernel.add_idle_task()
//!         ├─► kernel.add_task()        ← Register tasks (×N)
//!         ├─► kernel.start_task()      ← Queue START events
//!         ├─► configure SysTick        ← SysTick ISR calls SHARED.tick()
//!         └─► kernel.run()             ← Dispatch loop (no return in production)
//! ```
//!
//! ## Run Loop
//!
//! ```text
//!   loop:
//!     promote expired timer events into the event queue
//!     event queued?  ── yes ──► dispatch to its task
//!          │
//!          no
//!          ▼
//!     run idle task (code 0) ── Flow::Done ──► return
//! ```

use log::{debug, warn};

use crate::error::Error;
use crate::event::{Event, EventCode, EventData, EventQueue, START};
use crate::scheduler::Scheduler;
use crate::sleep::{self, SleepArbiter, SleepMode};
use crate::sync::{self, CriticalSection};
use crate::task::{Flow, Handler, Pid, TaskState};
use crate::timer::{Clock, Ticks, TimerList};

// ---------------------------------------------------------------------------
// Interrupt-shared state
// ---------------------------------------------------------------------------

/// Everything producers in interrupt context may touch.
pub struct Shared {
    pub events: EventQueue,
    pub timers: TimerList,
    pub clock: Clock,
}

impl Shared {
    pub const fn new() -> Self {
        Self {
            events: EventQueue::new(),
            timers: TimerList::new(),
            clock: Clock::new(),
        }
    }

    /// Empty both queues and zero the tick counter.
    pub fn reset(&self) {
        self.events.clear();
        self.timers.clear();
        self.clock.set(0);
    }

    /// Queue an event for `pid`. Safe from interrupt context.
    ///
    /// The pid is not validated here; events for unknown or inactive tasks
    /// are dropped at dispatch.
    pub fn send_event(&self, pid: Pid, code: EventCode, data: EventData) -> Result<(), Error> {
        self.events.send(Event::new(pid, code, data))
    }

    /// Queue an event for `pid` to be delivered `timeout` ticks from now.
    /// Safe from interrupt context.
    pub fn add_timer_event(
        &self,
        timeout: Ticks,
        pid: Pid,
        code: EventCode,
        data: EventData,
    ) -> Result<(), Error> {
        self.timers.add_at(
            |cs| self.clock.now_in(cs),
            timeout,
            Event::new(pid, code, data),
        )
    }

    pub fn is_queue_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Advance the tick counter. Call from the tick interrupt.
    #[inline]
    pub fn tick(&self) {
        self.clock.tick();
    }

    pub fn now(&self) -> Ticks {
        self.clock.now()
    }

    /// Move every expired timer event into the event queue, in expiry order.
    ///
    /// Stops early if the event queue fills up; the remaining entries stay
    /// in the timer list and are promoted on a later call. Returns the number
    /// of events promoted.
    pub fn promote_expired(&self) -> usize {
        sync::critical_section(|cs| self.promote_expired_in(cs))
    }

    pub(crate) fn promote_expired_in(&self, cs: CriticalSection<'_>) -> usize {
        let now = self.clock.now_in(cs);
        let mut promoted = 0;
        while !self.events.is_full_in(cs) {
            let Some(event) = self.timers.pop_expired_in(cs, now) else {
                break;
            };
            if self.events.send_in(cs, event).is_err() {
                break;
            }
            promoted += 1;
        }
        promoted
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Handler context
// ---------------------------------------------------------------------------

/// The part of the kernel a running handler can use.
///
/// Events sent from a handler go to the tail of the queue and are
/// dispatched after everything already queued.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    shared: &'a Shared,
    sleep: &'a SleepArbiter,
    pid: Pid,
}

impl<'a> Context<'a> {
    pub const fn new(shared: &'a Shared, sleep: &'a SleepArbiter) -> Self {
        Self {
            shared,
            sleep,
            pid: Pid::IDLE,
        }
    }

    /// The same context, seen from task `pid`.
    pub const fn for_task(self, pid: Pid) -> Self {
        Self { pid, ..self }
    }

    /// Pid of the task whose handler is running (`Pid::IDLE` for the idle
    /// task). Lets a task address events and timers to itself.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn send_event(&self, pid: Pid, code: EventCode, data: EventData) -> Result<(), Error> {
        self.shared.send_event(pid, code, data)
    }

    pub fn add_timer_event(
        &self,
        timeout: Ticks,
        pid: Pid,
        code: EventCode,
        data: EventData,
    ) -> Result<(), Error> {
        self.shared.add_timer_event(timeout, pid, code, data)
    }

    pub fn is_queue_empty(&self) -> bool {
        self.shared.is_queue_empty()
    }

    pub fn now(&self) -> Ticks {
        self.shared.now()
    }

    pub fn request_mode(&self, mode: SleepMode) {
        self.sleep.request(mode);
    }

    pub fn release_mode(&self, mode: SleepMode) {
        self.sleep.release(mode);
    }

    pub fn deepest_allowed_mode(&self) -> SleepMode {
        self.sleep.deepest_allowed_mode()
    }

    /// Block until the event queue is non-empty.
    ///
    /// Between checks the processor sleeps in `deepest_allowed_mode()`.
    /// Any interrupt wakes it, the tick included, so timer events that
    /// expire meanwhile are promoted here.
    ///
    /// The emptiness check and the sleep instruction run under one
    /// interrupt mask. An interrupt that queues an event after the check
    /// stays pending, and a pending interrupt ends `wfi` even while masked;
    /// it is serviced when the mask is released and the loop checks again.
    pub fn wait_for_events(&self) {
        self.wait_with(sleep::enter);
    }

    /// `wait_for_events` with the sleep instruction supplied by the caller.
    /// `enter` runs with interrupts masked.
    fn wait_with(&self, mut enter: impl FnMut(SleepMode)) {
        loop {
            let mode = self.sleep.deepest_allowed_mode();
            let ready = sync::critical_section(|cs| {
                self.shared.promote_expired_in(cs);
                if !self.shared.events.is_empty_in(cs) {
                    return true;
                }
                enter(mode);
                false
            });
            if ready {
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// The scheduler context: registry, sleep arbiter and a borrowed [`Shared`].
///
/// Independent instances do not interact, as long as each borrows its own
/// `Shared`.
pub struct Kernel<'a> {
    shared: &'a Shared,
    scheduler: Scheduler<'a>,
    sleep: SleepArbiter,
}

impl<'a> Kernel<'a> {
    /// Create a kernel on top of `shared`, resetting it.
    pub fn new(shared: &'a Shared) -> Self {
        shared.reset();
        Self {
            shared,
            scheduler: Scheduler::new(),
            sleep: SleepArbiter::new(),
        }
    }

    /// Return every component to its initial state: no tasks, empty queues,
    /// tick counter at zero, no sleep-mode requests.
    pub fn init(&mut self) {
        self.shared.reset();
        self.scheduler.reset();
        self.sleep.reset();
    }

    pub fn scheduler(&self) -> &Scheduler<'a> {
        &self.scheduler
    }

    pub fn context(&self) -> Context<'_> {
        Context::new(self.shared, &self.sleep)
    }

    // --- Task registry -----------------------------------------------------

    /// Register a task. It stays `Inactive` until `start_task`.
    pub fn add_task(&mut self, handler: &'a mut dyn Handler, name: &'static str) -> Result<Pid, Error> {
        self.scheduler.add_task(handler, name)
    }

    /// Install the idle task (pid 0), run whenever the event queue is empty.
    pub fn add_idle_task(&mut self, handler: &'a mut dyn Handler, name: &'static str) {
        self.scheduler.add_idle_task(handler, name);
    }

    /// Activate a registered task and queue its START event.
    ///
    /// If the START event cannot be queued the task is left `Inactive`, so
    /// the call can simply be retried.
    pub fn start_task(&mut self, pid: Pid) -> Result<(), Error> {
        self.scheduler.start(pid)?;
        if let Err(err) = self.shared.send_event(pid, START, None) {
            self.scheduler.cancel_start(pid);
            return Err(err);
        }
        Ok(())
    }

    /// Always fails with `Error::Unimplemented`.
    pub fn stop_task(&mut self, pid: Pid) -> Result<(), Error> {
        self.scheduler.stop(pid)
    }

    /// Always fails with `Error::Unimplemented`.
    pub fn remove_task(&mut self, pid: Pid) -> Result<(), Error> {
        self.scheduler.remove(pid)
    }

    pub fn task_state(&self, pid: Pid) -> Option<TaskState> {
        self.scheduler.state(pid)
    }

    // --- Events and timers -------------------------------------------------

    pub fn send_event(&self, pid: Pid, code: EventCode, data: EventData) -> Result<(), Error> {
        self.shared.send_event(pid, code, data)
    }

    pub fn add_timer_event(
        &self,
        timeout: Ticks,
        pid: Pid,
        code: EventCode,
        data: EventData,
    ) -> Result<(), Error> {
        self.shared.add_timer_event(timeout, pid, code, data)
    }

    pub fn is_queue_empty(&self) -> bool {
        self.shared.is_queue_empty()
    }

    #[inline]
    pub fn tick(&self) {
        self.shared.tick();
    }

    pub fn now(&self) -> Ticks {
        self.shared.now()
    }

    // --- Sleep modes -------------------------------------------------------

    pub fn request_mode(&self, mode: SleepMode) {
        self.sleep.request(mode);
    }

    pub fn release_mode(&self, mode: SleepMode) {
        self.sleep.release(mode);
    }

    pub fn deepest_allowed_mode(&self) -> SleepMode {
        self.sleep.deepest_allowed_mode()
    }

    pub fn wait_for_events(&self) {
        self.context().wait_for_events();
    }

    // --- Dispatch loop -----------------------------------------------------

    /// One pass of the run loop: promote expired timers, then dispatch one
    /// event, or run the idle task if there is none.
    ///
    /// Returns `Flow::Done` when the idle task asked to stop, or when the
    /// queue is empty and no idle task is installed.
    pub fn step(&mut self) -> Flow {
        self.shared.promote_expired();
        let cx = Context::new(self.shared, &self.sleep);

        match self.shared.events.receive() {
            Some(event) => {
                if let Err(err) = self.scheduler.dispatch(&cx, event) {
                    warn!("dropped {}: {}", event, err);
                }
                Flow::Continue
            }
            None => self.scheduler.run_idle(&cx).unwrap_or(Flow::Done),
        }
    }

    /// Dispatch events until the idle task returns `Flow::Done`.
    ///
    /// Production idle tasks never finish (they typically call
    /// `Context::wait_for_events`), so this does not return on target.
    pub fn run(&mut self) {
        if !self.scheduler.has_idle_task() {
            debug!("run: no idle task installed, returning once the queue drains");
        }
        while self.step() == Flow::Continue {}
        debug!("run: idle task finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EVENT_QUEUE_SIZE;

    struct Quiet;

    impl Handler for Quiet {
        fn handle(&mut self, _cx: &Context<'_>, _code: EventCode, _data: EventData) -> Flow {
            Flow::Continue
        }
    }

    #[test]
    fn test_promote_expired_in_order() {
        let shared = Shared::new();
        shared.add_timer_event(5, Pid(1), 5, None).unwrap();
        shared.add_timer_event(2, Pid(1), 2, None).unwrap();

        assert_eq!(shared.promote_expired(), 0);
        shared.clock.advance(2);
        assert_eq!(shared.promote_expired(), 1);
        shared.clock.advance(3);
        assert_eq!(shared.promote_expired(), 1);

        assert_eq!(shared.events.receive().map(|e| e.code), Some(2));
        assert_eq!(shared.events.receive().map(|e| e.code), Some(5));
        assert!(shared.timers.is_empty());
    }

    #[test]
    fn test_promote_stops_when_queue_full() {
        let shared = Shared::new();
        shared.add_timer_event(1, Pid(1), 1, None).unwrap();
        for code in 0..EVENT_QUEUE_SIZE as u8 {
            shared.send_event(Pid(1), code, None).unwrap();
        }
        shared.tick();

        assert_eq!(shared.promote_expired(), 0);
        assert_eq!(shared.timers.len(), 1);

        shared.events.receive().unwrap();
        assert_eq!(shared.promote_expired(), 1);
        assert!(shared.timers.is_empty());
    }

    #[test]
    fn test_timer_expiry_follows_clock() {
        let shared = Shared::new();
        shared.clock.set(Ticks::MAX - 1);
        shared.add_timer_event(3, Pid(1), 9, None).unwrap();
        assert_eq!(shared.timers.next_expiry(), Some(1));
        assert_eq!(
            shared.add_timer_event(0, Pid(1), 9, None),
            Err(Error::InvalidTimeout)
        );
    }

    #[test]
    fn test_wait_for_events_returns_on_queued_event() {
        let shared = Shared::new();
        let sleep = SleepArbiter::new();
        let cx = Context::new(&shared, &sleep);
        cx.send_event(Pid(1), 1, None).unwrap();
        cx.wait_for_events();
        assert!(!cx.is_queue_empty());
    }

    #[test]
    fn test_wait_for_events_promotes_expired_timer() {
        let shared = Shared::new();
        let sleep = SleepArbiter::new();
        let cx = Context::new(&shared, &sleep);
        cx.add_timer_event(4, Pid(2), 7, None).unwrap();
        shared.clock.advance(4);

        cx.wait_for_events();
        assert_eq!(shared.events.receive().map(|e| e.code), Some(7));
    }

    #[test]
    fn test_wait_resumes_after_event_queued_during_sleep() {
        let shared = Shared::new();
        let sleep = SleepArbiter::new();
        sleep.request(SleepMode::LIGHT);
        let cx = Context::new(&shared, &sleep);

        // Stands in for an interrupt that fires between the emptiness
        // check and the sleep instruction.
        let mut sleeps = 0;
        cx.wait_with(|mode| {
            assert_eq!(mode, SleepMode::LIGHT);
            sleeps += 1;
            if sleeps == 1 {
                shared.send_event(Pid(3), 6, None).unwrap();
            }
        });

        assert_eq!(sleeps, 1);
        assert_eq!(shared.events.receive().map(|e| e.code), Some(6));
    }

    #[test]
    fn test_start_task_rolls_back_when_queue_full() {
        let shared = Shared::new();
        let mut quiet = Quiet;
        let mut kernel = Kernel::new(&shared);
        let pid = kernel.add_task(&mut quiet, "quiet").unwrap();
        for code in 0..EVENT_QUEUE_SIZE as u8 {
            kernel.send_event(pid, code, None).unwrap();
        }

        assert_eq!(kernel.start_task(pid), Err(Error::QueueFull));
        assert_eq!(kernel.task_state(pid), Some(TaskState::Inactive));

        shared.events.receive().unwrap();
        assert_eq!(kernel.start_task(pid), Ok(()));
        assert_eq!(kernel.task_state(pid), Some(TaskState::Active));
    }

    #[test]
    fn test_run_without_idle_returns_when_drained() {
        let shared = Shared::new();
        let mut quiet = Quiet;
        let mut kernel = Kernel::new(&shared);
        let pid = kernel.add_task(&mut quiet, "quiet").unwrap();
        kernel.start_task(pid).unwrap();
        kernel.send_event(pid, 1, None).unwrap();

        kernel.run();
        assert!(kernel.is_queue_empty());
        assert_eq!(kernel.task_state(pid), Some(TaskState::Active));
    }

    #[test]
    fn test_init_clears_everything() {
        let shared = Shared::new();
        let mut quiet = Quiet;
        let mut kernel = Kernel::new(&shared);
        let pid = kernel.add_task(&mut quiet, "quiet").unwrap();
        kernel.start_task(pid).unwrap();
        kernel.add_timer_event(10, pid, 1, None).unwrap();
        kernel.request_mode(SleepMode::NONE);
        kernel.tick();

        kernel.init();
        assert!(kernel.is_queue_empty());
        assert!(shared.timers.is_empty());
        assert_eq!(kernel.now(), 0);
        assert_eq!(kernel.task_state(pid), None);
        assert_eq!(kernel.deepest_allowed_mode(), SleepMode::DEEPEST);
        assert_eq!(kernel.scheduler().task_count, 0);
    }
}
