//! Time sources.
//!
//! Wall time drives persisted timestamps and scheduling windows; the
//! monotonic reading drives rate windows and pause deadlines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Instant;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    wall_origin: DateTime<Utc>,
    mono_origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            wall_origin: start,
            mono_origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = *self.elapsed.lock();
        self.wall_origin + chrono::Duration::from_std(elapsed).unwrap_or_default()
    }

    fn monotonic(&self) -> Instant {
        self.mono_origin + *self.elapsed.lock()
    }
}

pub fn system() -> SharedClock {
    Arc::new(SystemClock)
}
