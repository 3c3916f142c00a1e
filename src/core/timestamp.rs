//! Wall-clock timestamps for samples
//!
//! Copy type with second/nanosecond split, same layout as a POSIX timespec.
//! Zero (or the all-ones marker) means "not set".

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Realtime timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

impl Timespec {
    /// Unset timestamp
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };

    /// Marker some sources use for "no timestamp available"
    pub const INVALID: Self = Self { sec: -1, nsec: -1 };

    #[inline]
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// Current realtime clock
    #[inline]
    pub fn now() -> Self {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: d.as_secs() as i64,
            nsec: d.subsec_nanos() as i64,
        }
    }

    /// Build from floating point seconds
    pub fn from_secs_f64(secs: f64) -> Self {
        let sec = secs.floor();
        let nsec = ((secs - sec) * NSEC_PER_SEC as f64).round() as i64;
        Self::normalized(sec as i64, nsec)
    }

    /// True if the timestamp was never set (zero or the invalid marker)
    #[inline]
    pub fn is_unset(&self) -> bool {
        *self == Self::ZERO || *self == Self::INVALID
    }

    #[inline]
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 / NSEC_PER_SEC as f64
    }

    /// Seconds elapsed from `self` to `later` (negative if `later` is earlier)
    #[inline]
    pub fn delta(&self, later: &Timespec) -> f64 {
        (later.sec - self.sec) as f64 + (later.nsec - self.nsec) as f64 / NSEC_PER_SEC as f64
    }

    /// Shift by a (possibly negative) number of seconds
    pub fn add_secs(&self, secs: f64) -> Self {
        let shift = Self::from_secs_f64(secs);
        Self::normalized(self.sec + shift.sec, self.nsec + shift.nsec)
    }

    fn normalized(mut sec: i64, mut nsec: i64) -> Self {
        sec += nsec.div_euclid(NSEC_PER_SEC);
        nsec = nsec.rem_euclid(NSEC_PER_SEC);
        Self { sec, nsec }
    }
}
