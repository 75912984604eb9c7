//! Timeouts and retries for remote calls
//!
//! Every remote call is raced against [`RetryPolicy::call_timeout`]; an
//! elapsed timer counts as [`RemoteError::Timeout`]. Transient failures are
//! retried with exponential backoff: `base_delay * 2^attempt`, or the
//! server's `Retry-After` hint when that is longer.
//!
//! `Unauthorized`, `NotFound` and `Rejected` are returned immediately.
//!
//! A chunked upload is one call made of several requests. The remote client
//! bounds each request by itself; [`RetryPolicy::spanning`] widens the
//! outer deadline to cover all of them.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cloudmirror_core::config::RemoteConfig;
use cloudmirror_core::ports::RemoteError;

/// Upper bound for a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// How remote calls are bounded and retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// First backoff delay
    pub base_delay: Duration,
    /// Deadline for each individual attempt
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(remote: &RemoteConfig) -> Self {
        Self {
            max_retries: remote.max_retries,
            base_delay: remote.retry_base_delay(),
            call_timeout: remote.call_timeout(),
        }
    }

    /// One attempt, no backoff
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            call_timeout,
        }
    }

    /// Same policy with the deadline stretched over `requests` requests
    pub fn spanning(&self, requests: u64) -> Self {
        let factor = u32::try_from(requests.max(1)).unwrap_or(u32::MAX);
        Self {
            call_timeout: self.call_timeout.saturating_mul(factor),
            ..*self
        }
    }

    /// Delay before the retry following failed attempt `attempt` (0-based)
    pub fn backoff(&self, attempt: u32, err: &RemoteError) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF);
        match err.retry_after() {
            Some(hint) => exponential.max(hint.min(MAX_BACKOFF)),
            None => exponential,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RemoteConfig::default())
    }
}

/// Run `f` under the policy's timeout, retrying transient failures
///
/// Cancellation only interrupts the backoff sleep between attempts; an
/// attempt already in flight runs to completion or timeout. When cancelled
/// during backoff the last error is returned.
pub async fn call_with_retry<F, Fut, T>(
    operation: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    f: F,
) -> Result<T, RemoteError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let outcome = match tokio::time::timeout(policy.call_timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(policy.call_timeout)),
        };

        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt, &err);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        info!(operation, "Retry abandoned due to shutdown");
                        return Err(err);
                    }
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
