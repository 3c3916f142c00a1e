//! Path and destination counters
//!
//! Lock-free counters using atomic operations, plus the start of the
//! current run for rate reports.
//! Updated from the path thread, read as snapshots from anywhere.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Per-path counters
///
/// Thread-safe counters updated from the path thread.
/// Snapshots taken for periodic reports and stat queries.
pub struct PathStats {
    /// Samples read from the source
    received: AtomicU64,
    /// Samples accepted by destination nodes (summed over destinations)
    sent: AtomicU64,
    /// Samples removed by read hooks
    skipped: AtomicU64,
    /// Samples dropped for arriving out of order
    dropped: AtomicU64,
    /// Samples lost because a destination queue was full
    overrun: AtomicU64,
    /// Read cycles that got fewer blocks than requested
    underrun: AtomicU64,
    /// Detected source restarts (not cleared by a restart)
    restarts: AtomicU64,
    /// Start of the current run, moved by restarts
    start_time: Mutex<Instant>,
}

/// Path counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PathStatsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub overrun: u64,
    pub underrun: u64,
    pub restarts: u64,
    pub rate: f64, // samples per second
    pub uptime_seconds: u64,
}

impl PathStats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            overrun: AtomicU64::new(0),
            underrun: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            start_time: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_received(&self, n: usize) {
        self.received.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sent(&self, n: usize) {
        self.sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skipped(&self, n: usize) {
        self.skipped.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self, n: usize) {
        self.dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overrun(&self, n: usize) {
        self.overrun.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_underrun(&self) {
        self.underrun.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a restart and clear every other counter
    pub fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        self.reset();
    }

    /// Clear all counters except the restart count and restart the clock
    /// used for `rate`
    pub fn reset(&self) {
        for counter in [
            &self.received,
            &self.sent,
            &self.skipped,
            &self.dropped,
            &self.overrun,
            &self.underrun,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.start_time.lock() = Instant::now();
    }

    pub fn snapshot(&self) -> PathStatsSnapshot {
        let received = self.received.load(Ordering::Relaxed);
        let elapsed = self.start_time.lock().elapsed();
        let uptime = elapsed.as_secs();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            received as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        PathStatsSnapshot {
            received,
            sent: self.sent.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            overrun: self.overrun.load(Ordering::Relaxed),
            underrun: self.underrun.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            rate,
            uptime_seconds: uptime,
        }
    }
}

impl Default for PathStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-destination counters
#[derive(Default)]
pub struct DestinationStats {
    enqueued: AtomicU64,
    sent: AtomicU64,
    overrun: AtomicU64,
    write_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DestinationStatsSnapshot {
    pub enqueued: u64,
    pub sent: u64,
    pub overrun: u64,
    pub write_errors: u64,
}

impl DestinationStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_enqueued(&self, n: usize) {
        self.enqueued.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sent(&self, n: usize) {
        self.sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overrun(&self, n: usize) {
        self.overrun.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.enqueued.store(0, Ordering::Relaxed);
        self.sent.store(0, Ordering::Relaxed);
        self.overrun.store(0, Ordering::Relaxed);
        self.write_errors.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DestinationStatsSnapshot {
        DestinationStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            overrun: self.overrun.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}
