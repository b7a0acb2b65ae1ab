//! Bounded retry for transient ENCV failures.

use std::future::Future;
use std::time::Duration;

use crate::error::VendorError;

const MAX_DELAY: Duration = Duration::from_secs(60);

/// How many extra attempts a request gets, and how long to wait between them.
///
/// Attempt `n` (1-based) waits `base × 2^(n-1)`, capped at 60 s, scaled by a
/// random factor in `[0.75, 1.25)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the wait before retry `attempt`, before jitter.
    fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(10);
        self.backoff_base.saturating_mul(factor).min(MAX_DELAY)
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.ceiling(attempt).mul_f64(0.75 + rand::random::<f64>() * 0.5)
    }

    /// Run `request` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    pub(crate) async fn run<T, F, Fut>(&self, mut request: F) -> Result<T, VendorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VendorError>>,
    {
        let mut attempt = 0;
        loop {
            let err = match request().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= self.max_retries || !is_transient(&err) {
                return Err(err);
            }
            attempt += 1;
            let delay = self.delay(attempt);
            tracing::warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "realm stats request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Timeouts, connection failures, and 5xx responses.
pub(crate) fn is_transient(err: &VendorError) -> bool {
    match err {
        VendorError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        VendorError::Status { status, .. } => *status >= 500,
        VendorError::Api(_) | VendorError::Deserialize { .. } | VendorError::MissingStatistics => {
            false
        }
    }
}
