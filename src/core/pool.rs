//! Fixed-block memory pool
//!
//! A [`Queue`] pre-filled with the offsets of every free block. Offsets are
//! relative to the pool's own arena, so a pool stays valid wherever its
//! arena lives. Allocation never grows the pool: an empty pool is an
//! underrun and the caller decides what to drop.

use crate::core::queue::Queue;
use std::cell::UnsafeCell;
use std::mem;

/// Alignment of every block in the arena
pub const BLOCK_ALIGNMENT: usize = 64;

/// Fixed-size block allocator
///
/// # Type Parameters
/// - `T`: The block payload. Constructed once per block at pool creation.
///
/// # Example
/// ```
/// use sigroute::core::pool::Pool;
///
/// let pool = Pool::with_capacity(4, || [0u8; 32]);
///
/// let off = pool.get().unwrap();
/// assert_eq!(pool.available(), 3);
///
/// pool.put(off);
/// assert_eq!(pool.available(), 4);
/// ```
pub struct Pool<T> {
    blocks: Box<[UnsafeCell<T>]>,
    queue: Queue,
    blocksz: usize,
    alignment: usize,
}

// SAFETY: blocks are only reached through offsets handed out by `get`.
// The queue protocol gives each offset to exactly one holder at a time, and
// the holder decides whether a block is mutated or shared read-only.
unsafe impl<T: Send> Send for Pool<T> {}
unsafe impl<T: Send + Sync> Sync for Pool<T> {}

impl<T> Pool<T> {
    /// Create a pool of `cnt` blocks, each built by `factory`.
    ///
    /// The block size defaults to `size_of::<T>()` rounded up to
    /// [`BLOCK_ALIGNMENT`].
    pub fn with_capacity<F>(cnt: usize, factory: F) -> Self
    where
        F: FnMut() -> T,
    {
        Self::with_block_size(cnt, mem::size_of::<T>(), factory)
    }

    /// Create a pool with an explicit logical block size.
    ///
    /// Used when `T` owns out-of-line storage whose size is part of the block.
    pub fn with_block_size<F>(cnt: usize, blocksz: usize, mut factory: F) -> Self
    where
        F: FnMut() -> T,
    {
        let alignment = BLOCK_ALIGNMENT;
        let blocksz = align_up(blocksz.max(1), alignment);

        let blocks: Box<[UnsafeCell<T>]> =
            (0..cnt).map(|_| UnsafeCell::new(factory())).collect();

        let queue = Queue::with_rounded_capacity(cnt);
        for i in 0..cnt {
            if queue.push(i * blocksz).is_err() {
                break;
            }
        }

        tracing::debug!(
            target: "pool",
            "Pool initialized: blocks={}, blocksz={}, len={}",
            cnt,
            blocksz,
            cnt * blocksz
        );

        Self {
            blocks,
            queue,
            blocksz,
            alignment,
        }
    }

    /// Take one free block
    #[inline]
    pub fn get(&self) -> Option<usize> {
        self.queue.pull().ok()
    }

    /// Take up to `out.len()` free blocks, returns how many were taken
    #[inline]
    pub fn get_many(&self, out: &mut [usize]) -> usize {
        self.queue.pull_many(out).unwrap_or(0)
    }

    /// Return one block
    #[inline]
    pub fn put(&self, off: usize) {
        debug_assert!(self.owns(off), "offset {} does not belong to this pool", off);
        if self.queue.push(off).is_err() {
            tracing::error!(target: "pool", "Pool overflow while returning block {}", off);
        }
    }

    /// Return several blocks, returns how many were accepted
    #[inline]
    pub fn put_many(&self, offs: &[usize]) -> usize {
        self.queue.push_many(offs).unwrap_or(0)
    }

    /// Total number of blocks
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Free blocks currently in the pool (advisory under concurrency)
    #[inline]
    pub fn available(&self) -> usize {
        self.queue.available()
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.blocksz
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Arena length in bytes
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.blocks.len() * self.blocksz
    }

    /// True if `off` is a block boundary inside this arena
    #[inline]
    pub fn owns(&self, off: usize) -> bool {
        off % self.blocksz == 0 && off / self.blocksz < self.blocks.len()
    }

    /// Raw pointer to the block at `off`.
    ///
    /// Dereferencing is only sound for the current holder of `off`.
    #[inline]
    pub fn block_ptr(&self, off: usize) -> *mut T {
        self.blocks[off / self.blocksz].get()
    }
}

#[inline]
const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pool_creation() {
        let pool = Pool::with_capacity(100, || [0u8; 100]);
        assert_eq!(pool.len(), 100);
        assert_eq!(pool.available(), 100);
        assert_eq!(pool.block_size(), 128);
        assert_eq!(pool.byte_len(), 12_800);
    }

    /// Counts warnings emitted while installed
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn test_odd_block_count_is_silent() {
        use tracing_subscriber::layer::SubscriberExt;

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        let pool = tracing::subscriber::with_default(subscriber, || Pool::with_capacity(5, || 0u32));
        assert_eq!(warnings.load(Ordering::Relaxed), 0);

        assert_eq!(pool.len(), 5);
        assert_eq!(pool.available(), 5);
        let mut offs = [0usize; 8];
        assert_eq!(pool.get_many(&mut offs), 5);
        assert!(pool.get().is_none());

        // A configured queue length is still reported
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));
        tracing::subscriber::with_default(subscriber, || Queue::new(5));
        assert_eq!(warnings.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_get_put() {
        let pool = Pool::with_capacity(10, || 42i32);

        let mut held = Vec::new();
        for _ in 0..10 {
            held.push(pool.get().unwrap());
        }

        assert!(pool.is_empty());
        assert!(pool.get().is_none());

        for off in held {
            assert!(pool.owns(off));
            pool.put(off);
        }
        assert_eq!(pool.available(), 10);
    }

    #[test]
    fn test_underrun_is_a_count() {
        let pool = Pool::with_capacity(3, || 0u64);
        let mut offs = [0usize; 5];

        assert_eq!(pool.get_many(&mut offs), 3);
        assert_eq!(pool.get_many(&mut offs[3..]), 0);

        assert_eq!(pool.put_many(&offs[..3]), 3);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_offsets_are_distinct_blocks() {
        let pool = Pool::with_capacity(8, || 0u32);
        let mut offs = [0usize; 8];
        assert_eq!(pool.get_many(&mut offs), 8);

        for (i, &off) in offs.iter().enumerate() {
            unsafe { *pool.block_ptr(off) = i as u32 };
        }
        for (i, &off) in offs.iter().enumerate() {
            assert_eq!(unsafe { *pool.block_ptr(off) }, i as u32);
        }
    }

    #[test]
    fn test_concurrent_access_keeps_invariant() {
        let pool = Arc::new(Pool::with_capacity(64, || [0u8; 256]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let mut offs = [0usize; 4];
                    for _ in 0..2_000 {
                        let n = pool.get_many(&mut offs);
                        assert_eq!(pool.put_many(&offs[..n]), n);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.available(), 64);
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pool<Vec<u8>>>();
    }

    proptest! {
        #[test]
        fn prop_held_plus_free_is_total(ops in prop::collection::vec((any::<bool>(), 1usize..6), 0..100)) {
            let pool = Pool::with_capacity(16, || 0u8);
            let mut held: Vec<usize> = Vec::new();

            for (take, n) in ops {
                if take {
                    let mut offs = vec![0usize; n];
                    let got = pool.get_many(&mut offs);
                    held.extend_from_slice(&offs[..got]);
                } else {
                    let n = n.min(held.len());
                    let back: Vec<usize> = held.drain(..n).collect();
                    prop_assert_eq!(pool.put_many(&back), n);
                }
                prop_assert_eq!(held.len() + pool.available(), pool.len());
            }
        }
    }
}
