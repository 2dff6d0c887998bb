//! # Timer Events
//!
//! One-shot timed events and the tick counter they are measured against.
//!
//! ## Ordering
//!
//! Pending entries live in a [`BoundedQueue`] and are kept sorted in
//! physical slot order, from the read index toward the write index, by
//! ascending time-to-fire. The entry at the read index always fires next,
//! so promotion only ever looks at the head.
//!
//! Sorting happens once, at insertion:
//!
//! ```text
//!   read                          tail (reserved slot)
//!    │                              │
//!   [ 3 ][ 7 ][ 12 ][ 40 ][ 55 ][    ]      add(timeout = 20)
//!                    ▲
//!                    first entry with remaining > 20
//!
//!   [ 3 ][ 7 ][ 12 ][ 20 ][ 40 ][ 55 ]      40 and 55 shifted one slot
//! ```
//!
//! Remaining time is measured from the same `now` the new expiry is
//! computed from. Equal remaining times keep the existing entry ahead of the
//! new one, so ties fire in insertion order.
//!
//! ## Wraparound
//!
//! Ticks are a wrapping `u32`. `now + timeout` is allowed to wrap; every
//! comparison treats the tick space as a circle, which is why timeouts are
//! capped at `MAX_TIMEOUT` (half the circle).

use core::cell::{Cell, RefCell};

use log::{trace, warn};

use crate::config::{MAX_TIMEOUT, TIMER_LIST_SIZE};
use crate::error::Error;
use crate::event::Event;
use crate::queue::BoundedQueue;
use crate::sync::{self, CriticalSection, Mutex};

/// Hardware tick count. Wraps.
pub type Ticks = u32;

/// Whether `expiry` is at or before `now` on the tick circle.
#[inline]
pub const fn is_expired(now: Ticks, expiry: Ticks) -> bool {
    (now.wrapping_sub(expiry) as i32) >= 0
}

/// Ticks left until `expiry`, seen from `now`.
///
/// An expiry that has already been reached counts as zero. Otherwise the
/// distance is taken modulo 2^32, so an `expiry` that has wrapped past
/// zero is still measured forward from `now`.
#[inline]
pub const fn remaining(now: Ticks, expiry: Ticks) -> Ticks {
    if is_expired(now, expiry) {
        0
    } else {
        expiry.wrapping_sub(now)
    }
}

// ---------------------------------------------------------------------------
// Tick counter
// ---------------------------------------------------------------------------

/// Monotonic tick counter, advanced by the SysTick interrupt.
pub struct Clock {
    ticks: Mutex<Cell<Ticks>>,
}

impl Clock {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Advance by one tick. Called from the tick interrupt.
    #[inline]
    pub fn tick(&self) {
        self.advance(1);
    }

    pub fn advance(&self, ticks: Ticks) {
        sync::critical_section(|cs| {
            let cell = self.ticks.borrow(cs);
            cell.set(cell.get().wrapping_add(ticks));
        });
    }

    /// Force the counter to `ticks`.
    pub fn set(&self, ticks: Ticks) {
        sync::critical_section(|cs| self.ticks.borrow(cs).set(ticks));
    }

    pub fn now(&self) -> Ticks {
        sync::critical_section(|cs| self.now_in(cs))
    }

    #[inline]
    pub fn now_in(&self, cs: CriticalSection<'_>) -> Ticks {
        self.ticks.borrow(cs).get()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Timer list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEntry {
    /// Absolute tick at which the event fires.
    pub expiry: Ticks,
    /// `false` marks a free slot.
    pub active: bool,
    pub event: Event,
}

impl TimerEntry {
    pub const EMPTY: TimerEntry = TimerEntry {
        expiry: 0,
        active: false,
        event: Event::EMPTY,
    };
}

/// Pending one-shot timer events, sorted by time-to-fire.
///
/// `add` is safe to call from interrupt handlers. Entries cannot be
/// cancelled once added.
pub struct TimerList<const N: usize = TIMER_LIST_SIZE> {
    queue: Mutex<RefCell<BoundedQueue<TimerEntry, N>>>,
}

type Slots<const N: usize> = BoundedQueue<TimerEntry, N>;

impl<const N: usize> TimerList<N> {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(BoundedQueue::new(TimerEntry::EMPTY))),
        }
    }

    /// Schedule `event` to fire `timeout` ticks after `now`.
    ///
    /// # Errors
    /// - `InvalidTimeout` for a zero timeout (send the event directly
    ///   instead) or one above `MAX_TIMEOUT`.
    /// - `TimerListFull` when no slot is free.
    pub fn add(&self, now: Ticks, timeout: Ticks, event: Event) -> Result<(), Error> {
        self.add_at(|_| now, timeout, event)
    }

    /// `add` with `now` read inside the same critical section as the
    /// insertion, so a tick cannot land in between.
    pub(crate) fn add_at<F>(&self, now: F, timeout: Ticks, event: Event) -> Result<(), Error>
    where
        F: FnOnce(CriticalSection<'_>) -> Ticks,
    {
        let result = sync::critical_section(|cs| self.add_in(cs, now(cs), timeout, event));
        match result {
            Ok(slot) => {
                trace!("timer: {} at +{} (slot {})", event, timeout, slot);
                self.trace_contents();
                Ok(())
            }
            Err(err) => {
                warn!("timer: rejected {} at +{}: {}", event, timeout, err);
                Err(err)
            }
        }
    }

    /// Sorted insertion. Returns the slot the new entry landed in.
    fn add_in(
        &self,
        cs: CriticalSection<'_>,
        now: Ticks,
        timeout: Ticks,
        event: Event,
    ) -> Result<usize, Error> {
        if timeout == 0 || timeout > MAX_TIMEOUT {
            return Err(Error::InvalidTimeout);
        }
        let entry = TimerEntry {
            expiry: now.wrapping_add(timeout),
            active: true,
            event,
        };

        let mut queue = self.queue.borrow_ref_mut(cs);
        if !queue.try_reserve_append() {
            return Err(Error::TimerListFull);
        }
        let tail = queue.write_index();

        let mut pos = queue.read_index();
        if !queue.is_empty() {
            while pos != tail {
                let current = queue.slot(pos);
                if !current.active || remaining(now, current.expiry) > timeout {
                    shift_toward_tail(&mut queue, pos, tail);
                    break;
                }
                pos = Slots::<N>::next_index(pos);
            }
        }
        *queue.slot_mut(pos) = entry;
        queue.commit_append();
        Ok(pos)
    }

    /// Remove and return the head event if its expiry has been reached.
    ///
    /// Inactive heads are discarded on the way.
    pub fn pop_expired(&self, now: Ticks) -> Option<Event> {
        sync::critical_section(|cs| self.pop_expired_in(cs, now))
    }

    pub(crate) fn pop_expired_in(&self, cs: CriticalSection<'_>, now: Ticks) -> Option<Event> {
        let mut queue = self.queue.borrow_ref_mut(cs);
        loop {
            let head = *queue.peek()?;
            if head.active && !is_expired(now, head.expiry) {
                return None;
            }
            if !queue.try_reserve_get() {
                return None;
            }
            let slot = queue.read_index();
            queue.slot_mut(slot).active = false;
            queue.commit_get();
            if head.active {
                return Some(head.event);
            }
        }
    }

    /// Expiry of the entry that fires next.
    pub fn next_expiry(&self) -> Option<Ticks> {
        sync::critical_section(|cs| self.queue.borrow_ref(cs).peek().map(|e| e.expiry))
    }

    pub fn is_empty(&self) -> bool {
        sync::critical_section(|cs| self.queue.borrow_ref(cs).is_empty())
    }

    pub fn len(&self) -> usize {
        sync::critical_section(|cs| self.queue.borrow_ref(cs).len())
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&self) {
        sync::critical_section(|cs| {
            let mut queue = self.queue.borrow_ref_mut(cs);
            queue.reset();
            for slot in 0..N {
                *queue.slot_mut(slot) = TimerEntry::EMPTY;
            }
        });
    }

    /// Copy of the pending entries in firing order, taken under one mask.
    /// Only the first `len` entries are meaningful.
    fn snapshot(&self) -> ([TimerEntry; N], usize) {
        sync::critical_section(|cs| {
            let queue = self.queue.borrow_ref(cs);
            let mut pos = queue.read_index();
            let entries = core::array::from_fn(|_| {
                let entry = *queue.slot(pos);
                pos = Slots::<N>::next_index(pos);
                entry
            });
            (entries, queue.len())
        })
    }

    fn trace_contents(&self) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        let (entries, len) = self.snapshot();
        for (n, entry) in entries[..len].iter().enumerate() {
            trace!("  [{}] expiry {} {}", n, entry.expiry, entry.event);
        }
    }
}

impl<const N: usize> Default for TimerList<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Open a gap at `from` by copying every entry in `from..tail` one slot
/// toward `tail`. Walks backward from the tail so nothing unread is
/// overwritten.
fn shift_toward_tail<const N: usize>(queue: &mut Slots<N>, from: usize, tail: usize) {
    let mut pos = tail;
    while pos != from {
        let prev = Slots::<N>::prev_index(pos);
        *queue.slot_mut(pos) = *queue.slot(prev);
        pos = prev;
    }
}
