//! Pool-allocated samples
//!
//! A [`Sample`] is one block of a [`SamplePool`]. Blocks are handed out as
//! [`SampleRef`] handles which count references the same way `Arc` does:
//! cloning a handle adds a holder, dropping the last holder puts the block
//! back into the pool. Handles can be turned into raw offsets for transport
//! through a [`Queue`](crate::core::queue::Queue) and turned back on the
//! other side without touching the count.
//!
//! Blocks are reused without zeroing. Whoever fills a sample must set every
//! field it relies on.

use crate::core::pool::Pool;
use crate::core::timestamp::Timespec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem::{self, ManuallyDrop};
use std::ops::Deref;
use std::sync::atomic::{self, AtomicUsize, Ordering};
use std::sync::Arc;

/// Type tag of a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Float,
    Integer,
    Boolean,
}

/// One tagged value of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalData {
    Float(f64),
    Integer(i64),
    Boolean(bool),
}

impl SignalData {
    #[inline]
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalData::Float(_) => SignalType::Float,
            SignalData::Integer(_) => SignalType::Integer,
            SignalData::Boolean(_) => SignalType::Boolean,
        }
    }

    /// Numeric value, whatever the tag
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match *self {
            SignalData::Float(f) => f,
            SignalData::Integer(i) => i as f64,
            SignalData::Boolean(b) => b as u8 as f64,
        }
    }

    /// Convert to another type tag
    pub fn cast(&self, to: SignalType) -> SignalData {
        match to {
            SignalType::Float => SignalData::Float(self.as_f64()),
            SignalType::Integer => SignalData::Integer(match *self {
                SignalData::Float(f) => f.round() as i64,
                SignalData::Integer(i) => i,
                SignalData::Boolean(b) => b as i64,
            }),
            SignalType::Boolean => SignalData::Boolean(self.as_f64() != 0.0),
        }
    }
}

impl Default for SignalData {
    fn default() -> Self {
        SignalData::Float(0.0)
    }
}

impl fmt::Display for SignalData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalData::Float(v) => write!(f, "{:.6}", v),
            SignalData::Integer(v) => write!(f, "{}", v),
            SignalData::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// Origin, receive and send timestamps of a sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleTimestamps {
    /// When the sample was produced at its source
    pub origin: Timespec,
    /// When this process received it
    pub received: Timespec,
    /// When this process last sent it
    pub sent: Timespec,
}

/// A timestamped vector of values with fixed capacity
#[derive(Debug, Clone)]
pub struct Sample {
    pub sequence: u64,
    pub ts: SampleTimestamps,
    length: usize,
    data: Box<[SignalData]>,
}

impl Sample {
    /// Stand-alone sample (outside any pool)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sequence: 0,
            ts: SampleTimestamps::default(),
            length: 0,
            data: vec![SignalData::default(); capacity].into_boxed_slice(),
        }
    }

    /// Logical block size of a sample with room for `capacity` values
    #[inline]
    pub const fn block_size(capacity: usize) -> usize {
        mem::size_of::<Sample>() + capacity * mem::size_of::<SignalData>()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Valid values
    #[inline]
    pub fn values(&self) -> &[SignalData] {
        &self.data[..self.length]
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [SignalData] {
        &mut self.data[..self.length]
    }

    /// Set the number of valid values (clamped to capacity)
    #[inline]
    pub fn set_len(&mut self, length: usize) {
        self.length = length.min(self.data.len());
    }

    /// Replace all values, returns how many fit
    pub fn set_values(&mut self, values: &[SignalData]) -> usize {
        let n = values.len().min(self.data.len());
        self.data[..n].copy_from_slice(&values[..n]);
        self.length = n;
        n
    }

    /// Append one value, `false` if the sample is full
    #[inline]
    pub fn push(&mut self, value: SignalData) -> bool {
        if self.length == self.data.len() {
            return false;
        }
        self.data[self.length] = value;
        self.length += 1;
        true
    }

    /// Copy sequence, timestamps and values from `other`
    pub fn copy_from(&mut self, other: &Sample) {
        self.sequence = other.sequence;
        self.ts = other.ts;
        self.set_values(other.values());
    }
}

/// Pool of samples with per-block reference counts
pub struct SamplePool {
    pool: Pool<Sample>,
    refcnt: Box<[AtomicUsize]>,
    capacity: usize,
}

impl SamplePool {
    /// Create a pool of `cnt` samples with room for `capacity` values each
    pub fn new(cnt: usize, capacity: usize) -> Arc<Self> {
        let pool = Pool::with_block_size(cnt, Sample::block_size(capacity), || {
            Sample::with_capacity(capacity)
        });
        let refcnt = (0..cnt).map(|_| AtomicUsize::new(0)).collect();

        Arc::new(Self {
            pool,
            refcnt,
            capacity,
        })
    }

    /// Allocate one sample
    #[inline]
    pub fn alloc(self: &Arc<Self>) -> Option<SampleRef> {
        let off = self.pool.get()?;
        self.refcnt(off).store(1, Ordering::Relaxed);
        Some(SampleRef {
            pool: Arc::clone(self),
            off,
        })
    }

    /// Allocate up to `cnt` samples, appending them to `out`.
    ///
    /// Returns the number allocated. `out` should have spare capacity
    /// reserved up front so this does not reallocate.
    pub fn alloc_many(self: &Arc<Self>, out: &mut Vec<SampleRef>, cnt: usize) -> usize {
        let mut offs = [0usize; 32];
        let mut allocated = 0;

        while allocated < cnt {
            let want = (cnt - allocated).min(offs.len());
            let got = self.pool.get_many(&mut offs[..want]);
            for &off in &offs[..got] {
                self.refcnt(off).store(1, Ordering::Relaxed);
                out.push(SampleRef {
                    pool: Arc::clone(self),
                    off,
                });
            }
            allocated += got;
            if got < want {
                break;
            }
        }

        allocated
    }

    /// Values per sample
    #[inline]
    pub fn sample_capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of blocks
    #[inline]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Free blocks (advisory)
    #[inline]
    pub fn available(&self) -> usize {
        self.pool.available()
    }

    /// Blocks currently held by someone (advisory)
    #[inline]
    pub fn in_use(&self) -> usize {
        self.len().saturating_sub(self.available())
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.pool.block_size()
    }

    #[inline]
    fn refcnt(&self, off: usize) -> &AtomicUsize {
        &self.refcnt[off / self.pool.block_size()]
    }

    #[inline]
    fn release(&self, off: usize) {
        if self.refcnt(off).fetch_sub(1, Ordering::Release) == 1 {
            atomic::fence(Ordering::Acquire);
            self.pool.put(off);
        }
    }
}

impl fmt::Debug for SamplePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplePool")
            .field("len", &self.len())
            .field("available", &self.available())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Counted handle to a pool-allocated sample
///
/// # Example
/// ```
/// use sigroute::core::sample::{SamplePool, SignalData};
///
/// let pool = SamplePool::new(4, 8);
/// let mut smp = pool.alloc().unwrap();
///
/// let s = smp.get_mut().unwrap();
/// s.sequence = 7;
/// s.set_values(&[SignalData::Float(1.5)]);
///
/// let shared = smp.clone(); // now read-only
/// assert!(smp.get_mut().is_none());
/// drop(shared);
/// drop(smp);
/// assert_eq!(pool.available(), 4);
/// ```
pub struct SampleRef {
    pool: Arc<SamplePool>,
    off: usize,
}

impl SampleRef {
    /// Mutable access while this handle is the only holder
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut Sample> {
        if self.pool.refcnt(self.off).load(Ordering::Acquire) == 1 {
            // SAFETY: refcount 1 means no other handle or queued offset
            // refers to this block, and `&mut self` excludes our own derefs.
            Some(unsafe { &mut *self.pool.pool.block_ptr(self.off) })
        } else {
            None
        }
    }

    #[inline]
    pub fn ref_count(&self) -> usize {
        self.pool.refcnt(self.off).load(Ordering::Relaxed)
    }

    /// Block offset inside the pool arena
    #[inline]
    pub fn offset(&self) -> usize {
        self.off
    }

    #[inline]
    pub fn pool(&self) -> &Arc<SamplePool> {
        &self.pool
    }

    /// Give up the handle but keep its reference, returning the offset.
    ///
    /// The reference must be reclaimed later with [`SampleRef::from_raw`]
    /// or the block leaks.
    #[inline]
    pub fn into_raw(self) -> usize {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never used again, so the Arc is moved out exactly once
        drop(unsafe { std::ptr::read(&this.pool) });
        this.off
    }

    /// Rebuild a handle from an offset produced by [`SampleRef::into_raw`].
    ///
    /// # Safety
    /// `off` must come from `into_raw` on a handle of this same `pool`, and
    /// each such offset may be reclaimed only once.
    #[inline]
    pub unsafe fn from_raw(pool: &Arc<SamplePool>, off: usize) -> Self {
        debug_assert!(pool.pool.owns(off));
        Self {
            pool: Arc::clone(pool),
            off,
        }
    }
}

impl Deref for SampleRef {
    type Target = Sample;

    #[inline]
    fn deref(&self) -> &Sample {
        // SAFETY: the block stays allocated while we hold a reference, and
        // mutable access is only granted through `get_mut` on a unique handle
        unsafe { &*self.pool.pool.block_ptr(self.off) }
    }
}

impl Clone for SampleRef {
    #[inline]
    fn clone(&self) -> Self {
        self.pool.refcnt(self.off).fetch_add(1, Ordering::Relaxed);
        Self {
            pool: Arc::clone(&self.pool),
            off: self.off,
        }
    }
}

impl Drop for SampleRef {
    #[inline]
    fn drop(&mut self) {
        self.pool.release(self.off);
    }
}

impl fmt::Debug for SampleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleRef")
            .field("off", &self.off)
            .field("refcnt", &self.ref_count())
            .field("sample", &**self)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::queue::Queue;

    fn fill(smp: &mut SampleRef, seq: u64) {
        let s = smp.get_mut().unwrap();
        s.sequence = seq;
        s.ts.origin = Timespec::new(100, seq as i64);
        s.ts.received = Timespec::new(101, 5);
        s.set_values(&[
            SignalData::Float(seq as f64 * 0.5),
            SignalData::Integer(-(seq as i64)),
            SignalData::Boolean(seq % 2 == 0),
        ]);
    }

    #[test]
    fn test_alloc_and_release() {
        let pool = SamplePool::new(4, 3);
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        assert_ne!(a.offset(), b.offset());
        assert_eq!(pool.in_use(), 2);

        drop(a);
        drop(b);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_alloc_many_reports_underrun() {
        let pool = SamplePool::new(5, 1);
        let mut smps = Vec::with_capacity(8);

        assert_eq!(pool.alloc_many(&mut smps, 8), 5);
        assert_eq!(smps.len(), 5);
        assert!(pool.alloc().is_none());

        smps.truncate(2);
        assert_eq!(pool.available(), 3);
        smps.clear();
        assert_eq!(pool.available(), 5);
    }

    #[test]
    fn test_alloc_many_larger_than_chunk() {
        let pool = SamplePool::new(100, 1);
        let mut smps = Vec::with_capacity(100);
        assert_eq!(pool.alloc_many(&mut smps, 70), 70);
        assert_eq!(pool.available(), 30);
    }

    #[test]
    fn test_shared_sample_is_read_only() {
        let pool = SamplePool::new(2, 1);
        let mut smp = pool.alloc().unwrap();
        assert!(smp.get_mut().is_some());

        let other = smp.clone();
        assert_eq!(smp.ref_count(), 2);
        assert!(smp.get_mut().is_none());

        drop(other);
        assert!(smp.get_mut().is_some());
    }

    #[test]
    fn test_released_only_after_last_holder() {
        let pool = SamplePool::new(1, 1);
        let smp = pool.alloc().unwrap();
        let a = smp.clone();
        let b = smp.clone();

        drop(smp);
        drop(a);
        assert_eq!(pool.available(), 0);
        drop(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_queue_round_trip_preserves_sample() {
        let pool = SamplePool::new(4, 4);
        let q = Queue::new(4);

        let mut smp = pool.alloc().unwrap();
        fill(&mut smp, 42);
        let expected = (*smp).clone();

        q.push(smp.into_raw()).unwrap();
        assert_eq!(pool.in_use(), 1);

        let off = q.pull().unwrap();
        let back = unsafe { SampleRef::from_raw(&pool, off) };

        assert_eq!(back.sequence, expected.sequence);
        assert_eq!(back.ts, expected.ts);
        assert_eq!(back.values(), expected.values());
        assert_eq!(back.ref_count(), 1);

        drop(back);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_into_raw_does_not_leak_pool_handle() {
        let pool = SamplePool::new(1, 1);
        let off = pool.alloc().unwrap().into_raw();
        assert_eq!(Arc::strong_count(&pool), 1);
        drop(unsafe { SampleRef::from_raw(&pool, off) });
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_values_clamped_to_capacity() {
        let mut s = Sample::with_capacity(2);
        let n = s.set_values(&[SignalData::Integer(1); 5]);
        assert_eq!(n, 2);
        assert_eq!(s.len(), 2);
        assert!(!s.push(SignalData::Integer(3)));
        s.set_len(10);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_signal_cast() {
        assert_eq!(SignalData::Float(2.6).cast(SignalType::Integer), SignalData::Integer(3));
        assert_eq!(SignalData::Integer(0).cast(SignalType::Boolean), SignalData::Boolean(false));
        assert_eq!(SignalData::Boolean(true).cast(SignalType::Float), SignalData::Float(1.0));
    }

    #[test]
    fn test_block_size_grows_with_capacity() {
        assert!(Sample::block_size(64) > Sample::block_size(1));
        let pool = SamplePool::new(2, 64);
        assert!(pool.block_size() >= Sample::block_size(64));
    }
}
