//! Bounded retries for transient API failures.
//!
//! GitHub's overload answers (502s, a bare 403) go away if waited out, so a
//! transient failure is retried after a fixed pause, a bounded number of
//! times. Authorization and permanent failures come back at once.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::error::{ApiError, ApiErrorKind};

/// How often, and after how long, to try a transient failure again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub pause: Duration,
}

impl RetryConfig {
    /// Ten retries, five seconds apart.
    pub const DEFAULT: Self = Self::fixed(10, Duration::from_secs(5));

    pub const fn fixed(max_retries: u32, pause: Duration) -> Self {
        Self { max_retries, pause }
    }

    /// The longest a request can spend pausing between attempts.
    pub fn total_max_wait(&self) -> Duration {
        self.pause * self.max_retries
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whether transient failures are retried at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    RetryTransient,
    NoRetry,
}

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryResult<T> {
    Success(T),

    /// Still failing transiently when the retries ran out.
    ExhaustedRetries {
        last_error: ApiError,
        /// Attempts made, the first one included.
        attempts: u32,
    },

    /// Failed in a way retrying can't fix.
    PermanentError(ApiError),
}

impl<T> RetryResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }
}

/// Runs `operation` until it succeeds, fails for good, or has failed
/// transiently `max_retries + 1` times.
pub async fn retry_transient<T, F, Fut>(
    config: RetryConfig,
    policy: RetryPolicy,
    mut operation: F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let allowed = match policy {
        RetryPolicy::RetryTransient => config.max_retries + 1,
        RetryPolicy::NoRetry => 1,
    };

    let mut attempts = 0;
    loop {
        attempts += 1;
        let error = match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if e.kind != ApiErrorKind::Transient => return RetryResult::PermanentError(e),
            Err(e) => e,
        };
        if attempts >= allowed {
            return RetryResult::ExhaustedRetries {
                last_error: error,
                attempts,
            };
        }
        debug!(attempts, pause = ?config.pause, error = %error, "Transient failure, retrying");
        tokio::time::sleep(config.pause).await;
    }
}
