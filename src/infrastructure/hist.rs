//! Histograms for path statistics
//!
//! Bucket bounds are not configured: the first `warmup` values only feed the
//! running mean/variance, then the range is fixed to mean ± 3σ split into
//! `buckets` equal bins. Zero allocation after construction.

use serde::Serialize;

/// Auto-ranging histogram
#[derive(Debug, Clone)]
pub struct Histogram {
    data: Vec<u64>,
    warmup: u64,

    low: f64,
    high: f64,
    resolution: f64,

    total: u64,
    higher: u64,
    lower: u64,

    highest: f64,
    lowest: f64,
    last: f64,

    // Welford running mean / sum of squares
    mean: f64,
    m2: f64,
}

/// Histogram summary for export
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub total: u64,
    pub higher: u64,
    pub lower: u64,
    pub highest: f64,
    pub lowest: f64,
    pub last: f64,
    pub mean: f64,
    pub variance: f64,
    pub stddev: f64,
    pub low: f64,
    pub high: f64,
    pub buckets: Vec<u64>,
}

impl Histogram {
    pub fn new(buckets: usize, warmup: u64) -> Self {
        let mut h = Self {
            data: vec![0; buckets],
            warmup,
            low: 0.0,
            high: 0.0,
            resolution: 0.0,
            total: 0,
            higher: 0,
            lower: 0,
            highest: f64::MIN,
            lowest: f64::MAX,
            last: 0.0,
            mean: 0.0,
            m2: 0.0,
        };
        h.reset();
        h
    }

    /// Add a value
    #[inline]
    pub fn put(&mut self, value: f64) {
        self.last = value;
        self.highest = self.highest.max(value);
        self.lowest = self.lowest.min(value);

        if self.total == self.warmup {
            let spread = 3.0 * self.stddev();
            self.low = self.mean() - spread;
            self.high = self.mean() + spread;
            self.resolution = if self.data.is_empty() {
                0.0
            } else {
                (self.high - self.low) / self.data.len() as f64
            };
        }

        if self.total >= self.warmup {
            self.count(value);
        }

        self.total += 1;

        let delta = value - self.mean;
        self.mean += delta / self.total as f64;
        self.m2 += delta * (value - self.mean);
    }

    #[inline]
    fn count(&mut self, value: f64) {
        if self.data.is_empty() {
            return;
        }

        if self.resolution <= 0.0 {
            // All warmup values identical: everything equal lands in the middle
            if value > self.high {
                self.higher += 1;
            } else if value < self.low {
                self.lower += 1;
            } else {
                let mid = self.data.len() / 2;
                self.data[mid] += 1;
            }
            return;
        }

        let idx = ((value - self.low) / self.resolution).floor();
        if idx >= self.data.len() as f64 {
            self.higher += 1;
        } else if idx < 0.0 {
            self.lower += 1;
        } else {
            self.data[idx as usize] += 1;
        }
    }

    /// Forget every value, keeping the bucket count
    pub fn reset(&mut self) {
        self.total = 0;
        self.higher = 0;
        self.lower = 0;
        self.highest = f64::MIN;
        self.lowest = f64::MAX;
        self.last = 0.0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.low = 0.0;
        self.high = 0.0;
        self.resolution = 0.0;
        self.data.fill(0);
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn last(&self) -> f64 {
        self.last
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        if self.total > 0 {
            self.mean
        } else {
            0.0
        }
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        if self.total > 1 {
            self.m2 / (self.total - 1) as f64
        } else {
            0.0
        }
    }

    #[inline]
    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Values that landed in a bucket
    pub fn counted(&self) -> u64 {
        self.data.iter().sum()
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            total: self.total,
            higher: self.higher,
            lower: self.lower,
            highest: self.highest,
            lowest: self.lowest,
            last: self.last,
            mean: self.mean(),
            variance: self.variance(),
            stddev: self.stddev(),
            low: self.low,
            high: self.high,
            buckets: self.data.clone(),
        }
    }
}
