// Retry policy for Ironic state-change requests.
//
// Only HTTP 409 is retried: Ironic answers with it while a conductor holds the
// node lock. Every other outcome, success included, is returned as-is.

use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::ironic::ApiError;
use crate::observability::api_metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Wait after the first busy response; doubled after each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Waits between consecutive attempts: base, 2×base, 4×base, ...
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        std::iter::successors(Some(self.base_delay), |d| d.checked_mul(2))
            .take(self.max_attempts.saturating_sub(1) as usize)
    }

    /// Delay before the attempt following `attempt` (1-based), if one is left.
    fn delay_after(&self, attempt: u32) -> Option<Duration> {
        self.delays().nth(attempt.saturating_sub(1) as usize)
    }

    /// Run `action`, retrying while Ironic reports busy.
    ///
    /// Returns the first non-busy outcome, or the last busy error once the
    /// attempt budget is spent.
    pub async fn execute<T, F, Fut>(&self, operation: &str, action: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0u32;
        debug!(operation, max_attempts = self.max_attempts, "Starting Ironic request");

        RetryIf::spawn(self.delays(), action, |err: &ApiError| {
            attempt += 1;
            if !err.is_busy() {
                return false;
            }
            api_metrics().record_busy();
            match self.delay_after(attempt) {
                Some(delay) => {
                    warn!(
                        operation,
                        attempt,
                        "Ironic is busy, will try again in {:?}",
                        delay
                    );
                    true
                }
                None => {
                    warn!(operation, attempts = attempt, "Ironic still busy, giving up");
                    false
                }
            }
        })
        .await
    }
}
