//! Injectable time source for due-time comparisons.

use std::sync::Mutex;
use time::OffsetDateTime;

/// A source of "now". The engine never calls `OffsetDateTime::now_utc()`
/// directly so tests can pin or advance time.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock pinned to a settable instant, for tests.
pub struct ManualClock {
    instant: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(at: OffsetDateTime) -> Self {
        Self {
            instant: Mutex::new(at),
        }
    }

    pub fn set(&self, at: OffsetDateTime) {
        *self.instant.lock().expect("clock poisoned") = at;
    }

    pub fn advance(&self, by: time::Duration) {
        let mut instant = self.instant.lock().expect("clock poisoned");
        *instant += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.instant.lock().expect("clock poisoned")
    }
}
