//! Queue with blocking consumers
//!
//! Wraps the lock-free [`Queue`] with a condition variable so a consumer can
//! sleep until data arrives. Producers never block; they only take the lock
//! to signal. Closing the queue wakes every sleeper.

use crate::core::queue::{Queue, QueueError};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

pub struct SignalledQueue {
    queue: Queue,
    lock: Mutex<()>,
    ready: Condvar,
}

impl SignalledQueue {
    pub fn new(size: usize) -> Self {
        Self {
            queue: Queue::new(size),
            lock: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    #[inline]
    pub fn push(&self, value: usize) -> Result<(), QueueError> {
        self.queue.push(value)?;
        self.signal();
        Ok(())
    }

    #[inline]
    pub fn push_many(&self, values: &[usize]) -> Result<usize, QueueError> {
        let n = self.queue.push_many(values)?;
        if n > 0 {
            self.signal();
        }
        Ok(n)
    }

    /// Non-blocking pull
    #[inline]
    pub fn pull(&self) -> Result<usize, QueueError> {
        self.queue.pull()
    }

    /// Non-blocking pull of several values
    #[inline]
    pub fn pull_many(&self, out: &mut [usize]) -> Result<usize, QueueError> {
        self.queue.pull_many(out)
    }

    /// Pull up to `out.len()` values, sleeping while the queue is empty.
    ///
    /// Sleeps at most `timeout` (forever with `None`). Returns `Ok(0)` on
    /// timeout or after [`SignalledQueue::wake_all`], `Closed` once the queue
    /// is closed and drained.
    pub fn pull_wait(&self, out: &mut [usize], timeout: Option<Duration>) -> Result<usize, QueueError> {
        let n = self.queue.pull_many(out)?;
        if n > 0 {
            return Ok(n);
        }

        {
            let mut guard = self.lock.lock();
            if self.queue.available() == 0 && !self.queue.is_closed() {
                match timeout {
                    Some(t) => {
                        self.ready.wait_for(&mut guard, t);
                    }
                    None => self.ready.wait(&mut guard),
                }
            }
        }

        self.queue.pull_many(out)
    }

    /// Wake every sleeping consumer without closing
    pub fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.ready.notify_all();
    }

    /// Close and wake every sleeping consumer
    pub fn close(&self) -> bool {
        let closed = self.queue.close();
        self.wake_all();
        closed
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.queue.available()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    #[inline]
    fn signal(&self) {
        let _guard = self.lock.lock();
        self.ready.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_pull_wait_times_out() {
        let q = SignalledQueue::new(4);
        let mut out = [0usize; 2];
        let start = Instant::now();
        assert_eq!(q.pull_wait(&mut out, Some(Duration::from_millis(20))), Ok(0));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_pull_wait_returns_ready_data() {
        let q = SignalledQueue::new(4);
        q.push_many(&[7, 8, 9]).unwrap();
        let mut out = [0usize; 2];
        assert_eq!(q.pull_wait(&mut out, None), Ok(2));
        assert_eq!(out, [7, 8]);
    }

    #[test]
    fn test_producer_wakes_consumer() {
        let q = Arc::new(SignalledQueue::new(8));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut out = [0usize; 1];
                loop {
                    match q.pull_wait(&mut out, Some(Duration::from_secs(5))) {
                        Ok(1) => return out[0],
                        Ok(_) => continue,
                        Err(e) => panic!("unexpected {e}"),
                    }
                }
            })
        };

        thread::sleep(Duration::from_millis(10));
        q.push(55).unwrap();
        assert_eq!(consumer.join().unwrap(), 55);
    }

    #[test]
    fn test_close_unblocks_consumer() {
        let q = Arc::new(SignalledQueue::new(8));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut out = [0usize; 1];
                loop {
                    match q.pull_wait(&mut out, None) {
                        Err(QueueError::Closed) => return true,
                        _ => continue,
                    }
                }
            })
        };

        thread::sleep(Duration::from_millis(10));
        assert!(q.close());
        assert!(consumer.join().unwrap());
        assert_eq!(q.push(1), Err(QueueError::Closed));
    }
}
