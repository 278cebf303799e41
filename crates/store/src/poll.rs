//! Bounded polling of remote jobs.
//!
//! Ingestion jobs and conversational runs are asynchronous on the vendor
//! side. Both are watched with the same loop: check, sleep, check again,
//! until a terminal state or the timeout. Dropping the returned future
//! cancels the wait.

use std::future::Future;
use std::time::Duration;
use vsctl_core::config::PollingConfig;
use vsctl_core::AppResult;

/// Interval and cap for one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn ingestion(config: &PollingConfig) -> Self {
        Self::new(config.interval(), config.ingestion_timeout())
    }

    pub fn query(config: &PollingConfig) -> Self {
        Self::new(config.interval(), config.query_timeout())
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::ingestion(&PollingConfig::default())
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    Ready(T),
    Pending,
}

/// Run `check` until it is ready or the policy's timeout elapses.
///
/// Returns `Ok(None)` on timeout. Errors from `check` end the loop at once.
pub async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    label: &str,
    mut check: F,
) -> AppResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<PollStep<T>>>,
{
    let started = tokio::time::Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let PollStep::Ready(value) = check().await? {
            tracing::debug!("{} finished after {} checks", label, attempts);
            return Ok(Some(value));
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            tracing::warn!(
                "{} still pending after {:.1}s ({} checks), giving up",
                label,
                elapsed.as_secs_f64(),
                attempts
            );
            return Ok(None);
        }

        tracing::trace!("{} pending (check {})", label, attempts);
        tokio::time::sleep(policy.interval.min(policy.timeout - elapsed)).await;
    }
}
