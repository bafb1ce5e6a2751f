//! Time sources and paced polling
//!
//! Estimators never busy-wait. Every settle and every poll goes through
//! [`DelayNs`], which on the firmware is backed by `embassy_time` and yields
//! to the executor.

use embedded_hal_async::delay::DelayNs;

/// A monotonic microsecond counter.
pub trait Monotonic {
    fn now_micros(&self) -> u64;

    fn now_millis(&self) -> u64 {
        self.now_micros() / 1_000
    }
}

/// Everything an estimator needs from time: cooperative sleeps and elapsed time.
pub trait Clock: DelayNs + Monotonic {}

impl<T: DelayNs + Monotonic> Clock for T {}

/// Bounded sleep-then-sample loop.
///
/// Each successful [`Pacer::tick`] has slept one interval and grants exactly
/// one sample. Once the bound is used up, `tick` returns `false` without
/// sleeping.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval_us: u32,
    remaining: u32,
    polls: u32,
}

impl Pacer {
    pub const fn new(interval_us: u32, max_polls: u32) -> Self {
        Self {
            interval_us,
            remaining: max_polls,
            polls: 0,
        }
    }

    pub async fn tick<C: Clock>(&mut self, clock: &mut C) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.polls += 1;
        // A zero interval would turn the loop back into a busy poll.
        clock.delay_us(self.interval_us.max(1)).await;
        true
    }

    /// Number of ticks granted so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimClock;
    use embassy_futures::block_on;

    #[test]
    fn test_pacer_is_bounded_and_advances_time() {
        let mut clock = SimClock::standalone();
        let mut pacer = Pacer::new(200_000, 3);

        let mut ticks = 0;
        while block_on(pacer.tick(&mut clock)) {
            ticks += 1;
        }

        assert_eq!(ticks, 3);
        assert_eq!(pacer.polls(), 3);
        assert_eq!(clock.now_micros(), 600_000);
        assert_eq!(clock.now_millis(), 600);
    }
}
