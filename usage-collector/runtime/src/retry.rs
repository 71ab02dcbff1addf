use crate::k8s;
use std::future::Future;
use thiserror::Error;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exponential backoff for metrics API requests.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub attempts: u32,
    pub base: Duration,
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Permanent(k8s::Error),

    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: k8s::Error,
    },
}

// === impl Backoff ===

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_millis(500),
        }
    }
}

impl Backoff {
    /// Runs `op` until it succeeds, fails permanently, or runs out of attempts. The delay doubles
    /// after each failure and no delay follows the final attempt.
    pub async fn retry<T, F, Fut>(
        &self,
        shutdown: &CancellationToken,
        target: &str,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = k8s::Result<T>>,
    {
        let mut delay = self.base;
        let mut attempt = 1;
        loop {
            if shutdown.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let res = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
                res = op() => res,
            };
            let error = match res {
                Ok(value) => return Ok(value),
                Err(error) if error.is_permanent() => return Err(RetryError::Permanent(error)),
                Err(error) => error,
            };

            warn!(
                %target,
                attempt = %format_args!("{attempt}/{}", self.attempts),
                %error,
                "Metrics request failed",
            );
            if attempt >= self.attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
                _ = time::sleep(delay) => {}
            }
            delay *= 2;
            attempt += 1;
        }
    }
}
