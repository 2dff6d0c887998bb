//! # Bounded Circular Queue
//!
//! Fixed-capacity FIFO storage with a two-phase commit protocol. Appending
//! and getting are each split into a *reserve* step and a *commit* step:
//!
//! ```text
//!   try_reserve_append()   slot at write_index() is granted to the producer
//!   <fill the slot>        payload copy, invisible to the consumer
//!   commit_append()        slot becomes visible, count += 1
//!
//!   try_reserve_get()      oldest slot at read_index() is granted
//!   <copy the slot out>
//!   commit_get()           slot is released, count -= 1
//! ```
//!
//! A consumer never observes a half-written payload because `count` and
//! the committed write index only move after the slot has been filled.
//! The queue itself is plain data (`&mut self` everywhere); callers that
//! share it with interrupt handlers wrap it in a critical-section mutex.
//!
//! Slots keep their last value after being consumed. Index arithmetic wraps
//! modulo the capacity `N`.

pub struct BoundedQueue<T, const N: usize> {
    slots: [T; N],
    /// Next slot to be filled (committed write position).
    write: usize,
    /// Oldest committed slot (committed read position).
    read: usize,
    /// Write position after the outstanding reservation is committed.
    pending_write: usize,
    /// Read position after the outstanding reservation is committed.
    pending_read: usize,
    count: usize,
}

impl<T: Copy, const N: usize> BoundedQueue<T, N> {
    /// Create an empty queue with every slot set to `fill`.
    pub const fn new(fill: T) -> Self {
        assert!(N > 0, "queue capacity must be nonzero");
        Self {
            slots: [fill; N],
            write: 0,
            read: 0,
            pending_write: 0,
            pending_read: 0,
            count: 0,
        }
    }

    /// Reset all indices and the count to zero. Slot contents are kept.
    pub fn reset(&mut self) {
        self.write = 0;
        self.read = 0;
        self.pending_write = 0;
        self.pending_read = 0;
        self.count = 0;
    }

    /// Position following `index`, wrapping at the capacity boundary.
    #[inline]
    pub const fn next_index(index: usize) -> usize {
        if index + 1 >= N {
            0
        } else {
            index + 1
        }
    }

    /// Position preceding `index`, wrapping at the capacity boundary.
    #[inline]
    pub const fn prev_index(index: usize) -> usize {
        if index == 0 {
            N - 1
        } else {
            index - 1
        }
    }

    /// Reserve the slot at `write_index()` for filling.
    ///
    /// Returns `false` if the queue is full. The reserved slot is not
    /// visible to `try_reserve_get` until `commit_append`.
    pub fn try_reserve_append(&mut self) -> bool {
        if self.count >= N {
            return false;
        }
        self.pending_write = Self::next_index(self.write);
        true
    }

    /// Publish the slot reserved by the last successful `try_reserve_append`.
    pub fn commit_append(&mut self) {
        self.write = self.pending_write;
        self.count += 1;
    }

    /// Reserve the oldest slot (at `read_index()`) for reading.
    ///
    /// Returns `false` if the queue is empty.
    pub fn try_reserve_get(&mut self) -> bool {
        if self.count == 0 {
            return false;
        }
        self.pending_read = Self::next_index(self.read);
        true
    }

    /// Release the slot reserved by the last successful `try_reserve_get`.
    pub fn commit_get(&mut self) {
        self.read = self.pending_read;
        self.count -= 1;
    }

    /// Slot a producer fills after `try_reserve_append`.
    #[inline]
    pub fn write_index(&self) -> usize {
        self.write
    }

    /// Oldest occupied slot; the one `try_reserve_get` grants.
    #[inline]
    pub fn read_index(&self) -> usize {
        self.read
    }

    #[inline]
    pub fn slot(&self, index: usize) -> &T {
        &self.slots[index]
    }

    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut T {
        &mut self.slots[index]
    }

    /// Append a value (both phases). Returns the value back if full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if !self.try_reserve_append() {
            return Err(value);
        }
        self.slots[self.write] = value;
        self.commit_append();
        Ok(())
    }

    /// Remove the oldest value (both phases).
    pub fn pop(&mut self) -> Option<T> {
        if !self.try_reserve_get() {
            return None;
        }
        let value = self.slots[self.read];
        self.commit_get();
        Some(value)
    }

    /// Oldest value without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.count == 0 {
            None
        } else {
            Some(&self.slots[self.read])
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= N
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exactly_n() {
        let mut q = BoundedQueue::<u32, 4>::new(0);
        for i in 0..4 {
            assert!(q.try_reserve_append());
            *q.slot_mut(q.write_index()) = i;
            q.commit_append();
        }
        assert!(q.is_full());
        assert!(!q.try_reserve_append());

        assert!(q.try_reserve_get());
        assert_eq!(*q.slot(q.read_index()), 0);
        q.commit_get();

        assert!(q.try_reserve_append());
        q.commit_append();
        assert!(!q.try_reserve_append());
    }

    #[test]
    fn test_reserved_slot_invisible_until_commit() {
        let mut q = BoundedQueue::<u32, 4>::new(0);
        assert!(q.try_reserve_append());
        *q.slot_mut(q.write_index()) = 9;

        assert!(q.is_empty());
        assert!(!q.try_reserve_get());
        assert_eq!(q.peek(), None);

        q.commit_append();
        assert_eq!(q.peek(), Some(&9));
    }

    #[test]
    fn test_fifo_order_across_wraparound() {
        let mut q = BoundedQueue::<u32, 3>::new(0);
        for round in 0..4 {
            for i in 0..3 {
                assert!(q.push(round * 10 + i).is_ok());
            }
            assert_eq!(q.push(99), Err(99));
            for i in 0..3 {
                assert_eq!(q.pop(), Some(round * 10 + i));
            }
            assert_eq!(q.pop(), None);
        }
    }

    #[test]
    fn test_index_helpers_wrap() {
        type Q = BoundedQueue<u8, 5>;
        assert_eq!(Q::next_index(0), 1);
        assert_eq!(Q::next_index(4), 0);
        assert_eq!(Q::prev_index(0), 4);
        assert_eq!(Q::prev_index(3), 2);

        type One = BoundedQueue<u8, 1>;
        assert_eq!(One::next_index(0), 0);
        assert_eq!(One::prev_index(0), 0);
    }

    #[test]
    fn test_reset_discards_contents() {
        let mut q = BoundedQueue::<u32, 4>::new(0);
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.reset();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
        assert_eq!(q.write_index(), 0);
        assert_eq!(q.pop(), None);
    }
}
