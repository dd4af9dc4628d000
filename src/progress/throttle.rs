//! Progress messages are emitted at a bounded rate: every 15 seconds at first, then every
//! 60 seconds once a run has gone on for more than 5 minutes.

use std::time::{Duration, Instant};

const FAST_INTERVAL: Duration = Duration::from_secs(15);
const SLOW_INTERVAL: Duration = Duration::from_secs(60);
const SLOW_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    started: Instant,
    next_report: Instant,
    fast: Duration,
    slow: Duration,
    slow_after: Duration,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::with_intervals(FAST_INTERVAL, SLOW_INTERVAL, SLOW_AFTER)
    }

    pub fn with_intervals(fast: Duration, slow: Duration, slow_after: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            next_report: now + fast,
            fast,
            slow,
            slow_after,
        }
    }

    /// True when a progress message is due; schedules the next one.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    pub fn ready_at(&mut self, now: Instant) -> bool {
        if now < self.next_report {
            return false;
        }
        let interval = if now.duration_since(self.started) >= self.slow_after {
            self.slow
        } else {
            self.fast
        };
        self.next_report = now + interval;
        true
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}
