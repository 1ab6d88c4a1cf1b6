//! Write timestamps.
//!
//! Every write stamps the item with epoch milliseconds. Two writes landing in
//! the same millisecond must still be ordered, so issued timestamps go through
//! `WriteStamper`, which never hands out the same value twice.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// `SystemTime`-backed clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// Issues strictly increasing write timestamps: `max(now, last + 1)`.
pub struct WriteStamper {
    clock: Box<dyn Clock>,
    last_issued: Cell<i64>,
}

impl WriteStamper {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            last_issued: Cell::new(i64::MIN),
        }
    }

    /// Returns the next write timestamp.
    pub fn next(&self) -> i64 {
        let now = self.clock.now_ms();
        let next = now.max(self.last_issued.get().saturating_add(1));
        self.last_issued.set(next);
        next
    }

    /// Raises the floor so later stamps are newer than `timestamp`.
    ///
    /// Fed every remote timestamp a sync or update sees, so local writes
    /// outrank writes from clients whose clocks run ahead. Only timestamps
    /// this client has observed are covered; a concurrent write landing
    /// between the observation and our write can still carry a higher stamp.
    pub fn observe(&self, timestamp: i64) {
        if timestamp > self.last_issued.get() {
            self.last_issued.set(timestamp);
        }
    }
}
