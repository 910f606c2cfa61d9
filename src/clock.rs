//! Monotonic write stamps
//!
//! Rows and tombstones are ordered by the stamp they were written with, so
//! a stamp must never go backward even if the wall clock does.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Issues strictly increasing nanosecond stamps anchored to the wall clock.
#[derive(Debug)]
pub struct WriteClock {
    /// Largest stamp ever issued or observed
    high_water_ns: AtomicI64,
}

impl WriteClock {
    pub fn new() -> Self {
        Self {
            high_water_ns: AtomicI64::new(0),
        }
    }

    /// Next stamp. Falls back to the previous stamp + 1ns when the wall
    /// clock has moved backward.
    pub fn next_stamp(&self) -> i64 {
        let wall = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        loop {
            let prev = self.high_water_ns.load(Ordering::Acquire);
            let stamp = wall.max(prev + 1);
            match self.high_water_ns.compare_exchange_weak(
                prev,
                stamp,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return stamp,
                Err(_) => continue,
            }
        }
    }

    /// Raise the high-water mark to at least `stamp`, e.g. after reading
    /// rows written by another process whose clock runs ahead.
    pub fn observe(&self, stamp: i64) {
        self.high_water_ns.fetch_max(stamp, Ordering::AcqRel);
    }

    /// Last stamp issued or observed.
    pub fn high_water(&self) -> i64 {
        self.high_water_ns.load(Ordering::Acquire)
    }
}

impl Default for WriteClock {
    fn default() -> Self {
        Self::new()
    }
}
