use std::{future::Future, time::Duration};

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::manager::{ApiError, ManagerError};

pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Time window for retrying writes that hit a transient provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RETRY_TIMEOUT,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// A provider error code plus a message fragment that marks it as retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientError {
    pub code: &'static str,
    pub message: &'static str,
}

impl TransientError {
    pub fn matches(&self, err: &ApiError) -> bool {
        err.message_contains(self.code, self.message)
    }
}

/// Turns a raw provider error into `Transient` when it matches one of `patterns`.
pub fn classify(patterns: &[TransientError], err: ApiError) -> ManagerError {
    if patterns.iter().any(|pattern| pattern.matches(&err)) {
        ManagerError::Transient(err)
    } else {
        ManagerError::Remote(err)
    }
}

/// Runs `fut` unless `cancel` fires first.
pub async fn cancellable<T, Fut>(cancel: &CancellationToken, fut: Fut) -> Result<T, ManagerError>
where
    Fut: Future<Output = Result<T, ManagerError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ManagerError::Cancelled),
        result = fut => result,
    }
}

/// Repeats `attempt` while it fails with `ManagerError::Transient` and the
/// policy's window is still open. Any other error is returned as is.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, ManagerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ManagerError>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempts = 0;
    loop {
        attempts += 1;
        match cancellable(cancel, attempt()).await {
            Err(ManagerError::Transient(last)) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ManagerError::OperationFailed {
                        attempts,
                        timeout: policy.timeout,
                        last,
                    });
                }
                warn!(attempts, error = %last, "transient provider error, retrying");
                let pause = policy.interval.min(deadline - now);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ManagerError::Cancelled),
                    _ = sleep(pause) => {}
                }
            }
            other => return other,
        }
    }
}
