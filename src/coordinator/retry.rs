//! Linear backoff for worker to server calls.

use crate::config::CoordinatorConfig;
use crate::error::WorkError;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub step: Duration,
    pub cap: Duration,
    /// Give up once this much time has passed since the first attempt
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CoordinatorConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.retry_initial_ms),
            step: Duration::from_millis(config.retry_step_ms),
            cap: Duration::from_millis(config.retry_cap_ms),
            deadline: Duration::from_secs(config.retry_deadline_secs),
        }
    }

    /// Delay after a failure that followed a wait of `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        (current + self.step).min(self.cap)
    }

    /// Run `op` until it succeeds, fails permanently, or the deadline passes.
    ///
    /// Only transport errors are retried.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, WorkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WorkError>>,
    {
        let started = Instant::now();
        let mut delay = self.initial;
        loop {
            match op().await {
                Err(WorkError::Transport(reason)) => {
                    let elapsed = started.elapsed();
                    if elapsed + delay > self.deadline {
                        return Err(WorkError::ServerUnavailable(elapsed));
                    }
                    warn!(
                        call = what,
                        %reason,
                        retry_in_ms = delay.as_millis() as u64,
                        "Server call failed"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                }
                other => return other,
            }
        }
    }
}
