//! Bounded-timeout polling.
//!
//! Every wait in a rollout (node readiness, health recovery, control-plane
//! reconnection) goes through [`Poller`]. The check always runs at least
//! once, even with a zero timeout, and there is no cancellation other than
//! the timeout itself.
//!
//! Sleeping and elapsed-time measurement use `tokio::time`, so tests can
//! pause the clock and run without real delays.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Fixed backoff between two checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Retries a check with a fixed interval until it passes or time runs out.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the sleep between checks.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `check` until it returns true. Returns false once `timeout` has
    /// elapsed since the first call.
    pub async fn until<F, Fut>(&self, timeout: Duration, check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        self.until_accepted(timeout, check, |passed| *passed)
            .await
            .is_ok()
    }

    /// Run `observe` until `accept` approves the observed value.
    ///
    /// Returns `Ok` with the accepted value, or `Err` with the last value
    /// observed before the timeout expired.
    pub async fn until_accepted<T, F, Fut, A>(
        &self,
        timeout: Duration,
        mut observe: F,
        accept: A,
    ) -> Result<T, T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
        A: Fn(&T) -> bool,
    {
        let start = Instant::now();
        loop {
            let value = observe().await;
            if accept(&value) {
                return Ok(value);
            }
            if start.elapsed() >= timeout {
                return Err(value);
            }
            sleep(self.interval).await;
        }
    }
}

/// [`Poller::until`] with the default interval.
pub async fn do_until<F, Fut>(timeout: Duration, check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    Poller::default().until(timeout, check).await
}
