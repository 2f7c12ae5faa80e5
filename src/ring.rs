// src/ring.rs

//! Lock-free single-producer/single-consumer slot ring.
//!
//! `SlotRing<T>` moves whole values (buffer handles) between exactly one producer thread and
//! exactly one consumer thread without locking or allocating. The capacity is rounded up to a
//! power of two so the slot index is a mask of the position counters.
//!
//! The write and read positions are free-running counters that are only masked when a slot is
//! touched. Because they never wrap at the capacity, `write - read` tells a full ring apart
//! from an empty one and every slot can hold data; no slot is kept in reserve.
//!
//! Two ownership modes are built on top of the primitive:
//! - [`Pool`] starts full. It owns every value and lends them out on `pop`.
//! - [`Handoff`] starts empty. The producer moves values in, the consumer moves them out.

use crate::error::{EngineError, EngineResult, ErrorKind};
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct SlotRing<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    mask: usize,
    /// Producer-owned position.
    write: AtomicUsize,
    /// Consumer-owned position.
    read: AtomicUsize,
}

// SAFETY: a slot is only touched by the producer while `write - read < capacity` says it is
// free, and only by the consumer while `write - read > 0` says it holds data. The release
// store of the owning side's counter publishes the slot to the other side.
unsafe impl<T: Send> Send for SlotRing<T> {}
unsafe impl<T: Send> Sync for SlotRing<T> {}

impl<T> SlotRing<T> {
    /// Creates an empty ring holding at least `capacity` values.
    pub fn with_capacity(capacity: usize) -> EngineResult<Self> {
        if capacity == 0 {
            return Err(EngineError::new(
                ErrorKind::InvalidBufferSize,
                "ring capacity must be greater than zero",
            ));
        }
        let capacity = capacity.checked_next_power_of_two().ok_or_else(|| {
            EngineError::new(
                ErrorKind::ResourceAllocationFailed,
                format!("ring capacity {} is too large", capacity),
            )
        })?;

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(None));

        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Moves `value` into the next free slot. Producer side only.
    ///
    /// A full ring hands the value back untouched.
    #[inline]
    pub fn push(&self, value: T) -> Result<(), T> {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if write.wrapping_sub(read) >= self.capacity() {
            return Err(value);
        }

        // SAFETY: the slot at `write` is free (checked above) and only the producer writes it.
        unsafe {
            *self.slots[write & self.mask].get() = Some(value);
        }
        self.write.store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Moves the oldest value out of the ring. Consumer side only.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Relaxed);
        if write == read {
            return None;
        }

        // SAFETY: the slot at `read` was published by the producer's release store of `write`
        // and only the consumer reads it until `read` moves past it.
        let value = unsafe { (*self.slots[read & self.mask].get()).take() };
        self.read.store(read.wrapping_add(1), Ordering::Release);
        value
    }

    /// Number of values currently queued.
    ///
    /// Advisory only: with both sides running the answer can be stale by the time it returns.
    pub fn current_size(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.wrapping_sub(read).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.current_size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.current_size() == self.capacity()
    }
}

impl<T> fmt::Debug for SlotRing<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRing")
            .field("capacity", &self.capacity())
            .field("len", &self.current_size())
            .finish()
    }
}

/// A ring that starts full and owns its values.
///
/// Values are lent with [`Pool::try_pop`] and must come back through [`Pool::push`]. Whatever
/// is still inside when the pool is dropped is dropped with it.
pub struct Pool<T> {
    ring: SlotRing<T>,
}

impl<T> Pool<T> {
    /// Builds a pool of `capacity` (rounded up to a power of two) values created by `make`,
    /// which receives the index of each value.
    pub fn from_fn(capacity: usize, mut make: impl FnMut(usize) -> T) -> EngineResult<Self> {
        let ring = SlotRing::with_capacity(capacity)?;
        for index in 0..ring.capacity() {
            if ring.push(make(index)).is_err() {
                return Err(EngineError::new(
                    ErrorKind::InternalError,
                    "pool ring rejected a value during pre-fill",
                ));
            }
        }
        Ok(Self { ring })
    }

    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.ring.pop()
    }

    #[inline]
    pub fn push(&self, value: T) -> Result<(), T> {
        self.ring.push(value)
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn current_size(&self) -> usize {
        self.ring.current_size()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("available", &self.current_size())
            .finish()
    }
}

/// A ring that starts empty and only moves values from its producer to its consumer.
pub struct Handoff<T> {
    ring: SlotRing<T>,
}

impl<T> Handoff<T> {
    pub fn new(capacity: usize) -> EngineResult<Self> {
        Ok(Self {
            ring: SlotRing::with_capacity(capacity)?,
        })
    }

    #[inline]
    pub fn push(&self, value: T) -> Result<(), T> {
        self.ring.push(value)
    }

    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.ring.pop()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn current_size(&self) -> usize {
        self.ring.current_size()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<T> fmt::Debug for Handoff<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("capacity", &self.capacity())
            .field("queued", &self.current_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        assert_eq!(SlotRing::<u8>::with_capacity(3).unwrap().capacity(), 4);
        assert_eq!(SlotRing::<u8>::with_capacity(4).unwrap().capacity(), 4);
        assert_eq!(SlotRing::<u8>::with_capacity(1000).unwrap().capacity(), 1024);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = SlotRing::<u8>::with_capacity(0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidBufferSize);
    }

    #[test]
    fn every_slot_is_usable() {
        let ring = SlotRing::with_capacity(8).unwrap();
        for i in 0..8 {
            assert!(ring.push(i).is_ok());
        }
        assert!(ring.is_full());
        assert_eq!(ring.push(99), Err(99));
        for i in 0..8 {
            assert_eq!(ring.pop(), Some(i));
        }
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn positions_keep_working_after_many_wraps() {
        let ring = SlotRing::with_capacity(2).unwrap();
        for i in 0..1000 {
            ring.push(i).unwrap();
            ring.push(i + 1).unwrap();
            assert_eq!(ring.current_size(), 2);
            assert_eq!(ring.pop(), Some(i));
            assert_eq!(ring.pop(), Some(i + 1));
        }
    }

    #[test]
    fn pool_starts_full() {
        let pool = Pool::from_fn(5, |i| i).unwrap();
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.current_size(), 8);
        assert_eq!(pool.try_pop(), Some(0));
        assert_eq!(pool.current_size(), 7);
        pool.push(0).unwrap();
        assert_eq!(pool.push(42), Err(42));
    }

    #[test]
    fn handoff_starts_empty() {
        let queue: Handoff<u32> = Handoff::new(4).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn dropping_a_ring_drops_its_values() {
        use std::sync::Arc;
        let marker = Arc::new(());
        {
            let ring = SlotRing::with_capacity(4).unwrap();
            ring.push(marker.clone()).unwrap();
            ring.push(marker.clone()).unwrap();
            assert_eq!(Arc::strong_count(&marker), 3);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
