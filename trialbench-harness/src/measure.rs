//! Wall-Clock Timing
//!
//! Nanosecond-resolution timer around one external operation. Durations are
//! kept in nanoseconds internally and converted to milliseconds for reports.

use std::time::{Duration, Instant};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Timer for measuring one operation
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed nanoseconds since `start`
    #[inline(always)]
    pub fn stop(&self) -> u64 {
        self.start.elapsed().as_nanos().min(u64::MAX as u128) as u64
    }

    /// Elapsed time since `start`, without stopping
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Convert nanoseconds to fractional milliseconds
#[inline]
pub fn nanos_to_millis(nanos: u64) -> f64 {
    nanos as f64 / NANOS_PER_MILLI
}
