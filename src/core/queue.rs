//! Lock-free bounded MPMC queue
//!
//! Dmitry Vyukov's bounded multi-producer multi-consumer ring. Cells carry
//! plain `usize` values which, by convention, are offsets into some arena
//! (see [`crate::core::pool`]). Storing offsets instead of pointers keeps the
//! queue valid no matter where the arena is mapped.
//!
//! Every cell owns a sequence number. A producer may only write cell `i` on
//! turn `pos` when `sequence == pos`, and publishes it by storing `pos + 1`.
//! A consumer may only read it when `sequence == pos + 1`, and hands it back
//! to producers of the next lap by storing `pos + capacity`.

use crossbeam_utils::{Backoff, CachePadded};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Failure of a single non-blocking queue operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is empty")]
    Empty,
    #[error("queue is closed")]
    Closed,
}

struct Cell {
    sequence: AtomicUsize,
    data_off: AtomicUsize,
}

/// Bounded lock-free MPMC queue of offsets
///
/// # Example
/// ```
/// use sigroute::core::queue::Queue;
///
/// let q = Queue::new(4);
/// q.push(128).unwrap();
/// assert_eq!(q.pull(), Ok(128));
/// ```
pub struct Queue {
    buffer: Box<[Cell]>,
    mask: usize,
    tail: CachePadded<AtomicUsize>,
    head: CachePadded<AtomicUsize>,
    closed: AtomicBool,
}

impl Queue {
    /// Create a queue holding up to `size` elements.
    ///
    /// `size` must be a power of two; other values are rounded up with a
    /// warning.
    pub fn new(size: usize) -> Self {
        if !size.is_power_of_two() {
            let rounded = size.max(1).next_power_of_two();
            tracing::warn!(target: "pool", "Queue size was changed from {} to {}", size, rounded);
        }
        Self::with_rounded_capacity(size)
    }

    /// Like [`Queue::new`], but rounds up silently.
    ///
    /// For internal queues whose length is derived, not configured.
    pub(crate) fn with_rounded_capacity(size: usize) -> Self {
        let size = size.max(1).next_power_of_two();

        let buffer = (0..size)
            .map(|i| Cell {
                sequence: AtomicUsize::new(i),
                data_off: AtomicUsize::new(0),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buffer,
            mask: size - 1,
            tail: CachePadded::new(AtomicUsize::new(0)),
            head: CachePadded::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of cells
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Estimate of the number of queued elements.
    ///
    /// Only advisory while other threads are pushing or pulling.
    #[inline]
    pub fn available(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head).min(self.capacity())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Close the queue: pushes fail from now on, pulls drain what is left.
    ///
    /// Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Enqueue one value without blocking
    pub fn push(&self, value: usize) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let backoff = Backoff::new();
        let mut pos = self.tail.load(Ordering::Relaxed);
        let cell = loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(Ordering::Acquire);
            let dif = seq.wrapping_sub(pos) as isize;

            match dif.cmp(&0) {
                CmpOrdering::Equal => {
                    match self.tail.compare_exchange_weak(
                        pos,
                        pos.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break cell,
                        Err(current) => {
                            pos = current;
                            backoff.spin();
                        }
                    }
                }
                CmpOrdering::Less => return Err(QueueError::Full),
                CmpOrdering::Greater => {
                    backoff.spin();
                    pos = self.tail.load(Ordering::Relaxed);
                }
            }
        };

        cell.data_off.store(value, Ordering::Relaxed);
        cell.sequence.store(pos.wrapping_add(1), Ordering::Release);

        Ok(())
    }

    /// Dequeue one value without blocking.
    ///
    /// An empty closed queue reports [`QueueError::Closed`].
    pub fn pull(&self) -> Result<usize, QueueError> {
        let backoff = Backoff::new();
        let mut pos = self.head.load(Ordering::Relaxed);
        let cell = loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(Ordering::Acquire);
            let dif = seq.wrapping_sub(pos.wrapping_add(1)) as isize;

            match dif.cmp(&0) {
                CmpOrdering::Equal => {
                    match self.head.compare_exchange_weak(
                        pos,
                        pos.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break cell,
                        Err(current) => {
                            pos = current;
                            backoff.spin();
                        }
                    }
                }
                CmpOrdering::Less => {
                    if !self.closed.load(Ordering::Acquire) {
                        return Err(QueueError::Empty);
                    }
                    // Pushes that completed before close() must still drain
                    let seq = cell.sequence.load(Ordering::Acquire);
                    if seq.wrapping_sub(pos.wrapping_add(1)) as isize >= 0 {
                        pos = self.head.load(Ordering::Relaxed);
                        continue;
                    }
                    return Err(QueueError::Closed);
                }
                CmpOrdering::Greater => {
                    backoff.spin();
                    pos = self.head.load(Ordering::Relaxed);
                }
            }
        };

        let value = cell.data_off.load(Ordering::Relaxed);
        cell.sequence
            .store(pos.wrapping_add(self.mask + 1), Ordering::Release);

        Ok(value)
    }

    /// Push as many of `values` as fit.
    ///
    /// Returns the number pushed, or `Closed` if the queue is closed and
    /// nothing was pushed. A shortfall is not retried.
    pub fn push_many(&self, values: &[usize]) -> Result<usize, QueueError> {
        for (i, &value) in values.iter().enumerate() {
            match self.push(value) {
                Ok(()) => {}
                Err(QueueError::Closed) if i == 0 => return Err(QueueError::Closed),
                Err(_) => return Ok(i),
            }
        }
        Ok(values.len())
    }

    /// Pull up to `out.len()` values into `out`.
    ///
    /// Returns the number pulled, or `Closed` once the queue is closed and drained.
    pub fn pull_many(&self, out: &mut [usize]) -> Result<usize, QueueError> {
        for i in 0..out.len() {
            match self.pull() {
                Ok(value) => out[i] = value,
                Err(QueueError::Closed) if i == 0 => return Err(QueueError::Closed),
                Err(_) => return Ok(i),
            }
        }
        Ok(out.len())
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}
