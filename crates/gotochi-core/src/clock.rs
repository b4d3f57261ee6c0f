//! ============================================================================
//! Clock - Wall-clock source for expiry checks
//! ============================================================================
//! Session expiry compares against `Clock::now_ms`. `SystemClock` reads the
//! real time; `MockClock` is settable for tests.
//! ============================================================================

use std::sync::atomic::{AtomicI64, Ordering};

/// Wall-clock source in UNIX epoch milliseconds
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests
pub struct MockClock {
    now: AtomicI64,
}

impl MockClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
