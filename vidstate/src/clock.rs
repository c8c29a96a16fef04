//! Time sources used by every expiry decision in the crate.
//!
//! Monotonic [`Instant`]s drive in-memory expiry; wall-clock UTC timestamps
//! are used where a value leaves the process (persisted processing records,
//! operator-facing listings).

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type SharedClock = Arc<dyn Clock>;

pub trait Clock: Send + Sync + 'static {
    /// Monotonic now, used for TTL arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock now.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// Virtual clock that only moves when told to.
///
/// Both the monotonic and the UTC reading advance together so persisted
/// timestamps and in-memory deadlines stay consistent in tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_utc: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.elapsed())
            .ok()
            .and_then(|delta| self.origin_utc.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// An entry is live strictly before its deadline. Shared by lazy eviction
/// and the background sweep so both paths agree on the boundary.
#[inline]
pub fn is_expired(expires_at: Instant, now: Instant) -> bool {
    now >= expires_at
}

/// Project a monotonic instant onto the wall clock, relative to a pair of
/// readings taken at the same moment.
pub(crate) fn to_utc(at: Instant, now: Instant, now_utc: DateTime<Utc>) -> DateTime<Utc> {
    let shifted = if at >= now {
        TimeDelta::from_std(at - now).map(|d| now_utc.checked_add_signed(d))
    } else {
        TimeDelta::from_std(now - at).map(|d| now_utc.checked_sub_signed(d))
    };
    shifted.ok().flatten().unwrap_or(now_utc)
}
