//! Clock abstractions: monotonic nanoseconds and wall-clock milliseconds.
//!
//! The conductor measures all intervals on the monotonic clock and compares
//! driver liveness on the wall clock, so both are injectable. The manual
//! variants exist for deterministic timeout tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonic nanosecond clock.
pub trait NanoClock: Send + Sync {
    fn nanos(&self) -> u64;
}

/// Wall-clock millisecond clock.
pub trait EpochClock: Send + Sync {
    fn millis(&self) -> i64;
}

/// System monotonic clock backed by `CLOCK_MONOTONIC`.
///
/// Not affected by system time changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNanoClock;

impl NanoClock for SystemNanoClock {
    fn nanos(&self) -> u64 {
        clock_gettime_nanos(libc::CLOCK_MONOTONIC)
    }
}

/// System wall clock backed by `CLOCK_REALTIME`, in milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEpochClock;

impl EpochClock for SystemEpochClock {
    fn millis(&self) -> i64 {
        (clock_gettime_nanos(libc::CLOCK_REALTIME) / 1_000_000) as i64
    }
}

fn clock_gettime_nanos(clock_id: libc::clockid_t) -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    unsafe {
        libc::clock_gettime(clock_id, &mut ts);
    }

    // tv_sec is signed, but should always be positive for the clocks we use
    let sec_nanos = (ts.tv_sec as u64).saturating_mul(1_000_000_000);
    sec_nanos.saturating_add(ts.tv_nsec as u64)
}

/// A nanosecond clock that only moves when told to. For tests.
#[derive(Debug, Default)]
pub struct ManualNanoClock {
    now: AtomicU64,
}

impl ManualNanoClock {
    pub fn new(start: u64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(start),
        })
    }

    pub fn advance(&self, delta: u64) {
        self.now.fetch_add(delta, Ordering::Release);
    }

    pub fn set(&self, nanos: u64) {
        self.now.store(nanos, Ordering::Release);
    }
}

impl NanoClock for ManualNanoClock {
    fn nanos(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

/// A millisecond wall clock that only moves when told to. For tests.
#[derive(Debug, Default)]
pub struct ManualEpochClock {
    now: AtomicI64,
}

impl ManualEpochClock {
    pub fn new(start: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start),
        })
    }

    pub fn advance(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::Release);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::Release);
    }
}

impl EpochClock for ManualEpochClock {
    fn millis(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nano_clock_is_monotonic() {
        let clock = SystemNanoClock;
        let t1 = clock.nanos();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let t2 = clock.nanos();

        assert!(t2 > t1, "time should be monotonically increasing");
        assert!(t2 - t1 >= 5_000_000, "at least 5ms should have passed");
    }

    #[test]
    fn epoch_clock_is_plausible() {
        // After 2020-01-01 and before 2100-01-01, in milliseconds.
        let now = SystemEpochClock.millis();
        assert!(now > 1_577_836_800_000);
        assert!(now < 4_102_444_800_000);
    }

    #[test]
    fn manual_clocks_advance() {
        let nano = ManualNanoClock::new(100);
        assert_eq!(nano.nanos(), 100);
        nano.advance(50);
        assert_eq!(nano.nanos(), 150);
        nano.set(10);
        assert_eq!(nano.nanos(), 10);

        let epoch = ManualEpochClock::new(1_000);
        epoch.advance(234);
        assert_eq!(epoch.millis(), 1_234);
    }
}
