//! # Telemetry Scheduler
//!
//! Decides when a sensor-read-compute-publish cycle is due. The clock is
//! passed in rather than read here, so the main loop can call
//! [`TelemetryScheduler::tick`] on every iteration without blocking and the
//! tests can simulate time.

use embassy_time::{Duration, Instant};

/// A due telemetry cycle, carrying the monotonically increasing cycle
/// number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollTick {
    pub count: u32,
}

/// Fixed-interval trigger for the telemetry cycle.
pub struct TelemetryScheduler {
    last_poll: Instant,
    interval: Duration,
    loop_count: u32,
}

impl TelemetryScheduler {
    /// The first cycle becomes due one full interval after `now`.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            last_poll: now,
            interval,
            loop_count: 0,
        }
    }

    /// Returns a trigger and advances `last_poll` to `now` exactly when the
    /// interval has elapsed; otherwise does nothing at all.
    pub fn tick(&mut self, now: Instant) -> Option<PollTick> {
        if now > self.last_poll + self.interval {
            self.last_poll = now;
            self.loop_count += 1;
            Some(PollTick {
                count: self.loop_count,
            })
        } else {
            None
        }
    }

    pub fn last_poll_time(&self) -> Instant {
        self.last_poll
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of cycles triggered so far.
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    #[test]
    fn tick_fires_only_after_the_interval_elapses() {
        let mut sched = TelemetryScheduler::new(Duration::from_secs(15), at(0));

        assert_eq!(sched.tick(at(10)), None);
        assert_eq!(sched.last_poll_time(), at(0));

        assert_eq!(sched.tick(at(16)), Some(PollTick { count: 1 }));
        assert_eq!(sched.last_poll_time(), at(16));
    }

    #[test]
    fn interval_boundary_is_exclusive() {
        let mut sched = TelemetryScheduler::new(Duration::from_secs(15), at(0));
        // Exactly one interval is not yet "elapsed".
        assert_eq!(sched.tick(at(15)), None);
        assert_eq!(sched.tick(at(15)), None);
    }

    #[test]
    fn loop_count_increases_monotonically() {
        let mut sched = TelemetryScheduler::new(Duration::from_secs(15), at(0));

        assert_eq!(sched.tick(at(16)).unwrap().count, 1);
        assert_eq!(sched.tick(at(17)), None);
        assert_eq!(sched.tick(at(40)).unwrap().count, 2);
        assert_eq!(sched.tick(at(60)).unwrap().count, 3);
        assert_eq!(sched.loop_count(), 3);
    }

    #[test]
    fn untriggered_ticks_have_no_side_effects() {
        let mut sched = TelemetryScheduler::new(Duration::from_secs(15), at(0));
        for s in 1..=15 {
            assert_eq!(sched.tick(at(s)), None);
        }
        assert_eq!(sched.loop_count(), 0);
        assert_eq!(sched.last_poll_time(), at(0));
    }
}
