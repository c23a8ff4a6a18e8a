//! Time source for the workflow engine

use chrono::{DateTime, Utc};

/// Source of the current time
///
/// Every timestamp the engine writes, and every TTL comparison it makes, goes
/// through this trait so tests can move time explicitly.
pub trait Clock {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
