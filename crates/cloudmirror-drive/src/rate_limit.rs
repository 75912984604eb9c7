//! Throttling signals from the Drive API
//!
//! Drive reports throttling either as HTTP 429 or as HTTP 403 with a
//! rate-limit reason in the error body. Both become
//! [`RemoteError::RateLimited`](cloudmirror_core::ports::RemoteError::RateLimited)
//! and are retried by the sync engine's backoff.

use std::time::Duration;

use tracing::warn;

/// Longest `Retry-After` honoured from an HTTP-date
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Error reasons Drive uses for quota throttling on 403 responses
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Parse a `Retry-After` header (delta-seconds or HTTP-date)
///
/// Returns `None` when the value is unusable so the caller falls back to
/// its own backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return match wait.to_std() {
            Ok(wait) if wait <= MAX_RETRY_AFTER => Some(wait),
            Ok(_) => Some(MAX_RETRY_AFTER),
            // Date already passed
            Err(_) => Some(Duration::ZERO),
        };
    }

    warn!(value, "Could not parse Retry-After header");
    None
}

pub fn is_rate_limit_reason(reason: &str) -> bool {
    RATE_LIMIT_REASONS.contains(&reason)
}
