//! Conflict retry with bounded, jittered backoff.
//!
//! Every write the engine makes to an `OpenSearchCluster` (finalizers, status)
//! is a read-modify-write against an optimistically-concurrent store. When the
//! write loses a race the store answers with a conflict, and the whole
//! read-modify-write is run again from the read. Anything that is not a
//! conflict aborts immediately.
//!
//! # Example
//!
//! ```ignore
//! use opensearch_operator::retry::{retry_on_conflict, RetryConfig};
//!
//! let cluster = retry_on_conflict(
//!     &RetryConfig::conflict_default(),
//!     "add_finalizer",
//!     &cancel,
//!     || async { read_modify_write(&store, &key).await },
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Error;

/// Backoff parameters for conflict retries.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (always >= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt
    pub backoff_multiplier: f64,
    /// Extra random fraction added to each delay (0.1 = up to +10%)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::conflict_default()
    }
}

impl RetryConfig {
    /// Retry policy used for every status/finalizer write.
    ///
    /// Mirrors the default retry of the Kubernetes client libraries: five
    /// attempts, 10ms apart, with 10% jitter.
    pub fn conflict_default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            jitter: 0.1,
        }
    }

    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Self::conflict_default()
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(1.0..1.0 + self.jitter);
        Duration::from_secs_f64(delay.as_secs_f64() * factor).min(self.max_delay)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `operation` until it succeeds, fails with a non-conflict error, or the
/// attempt budget is spent.
///
/// `operation` must perform the complete read-modify-write on every call; it
/// is never resumed half way. Waiting between attempts observes `cancel`.
///
/// # Returns
/// The operation's value, the first non-conflict error, the last conflict
/// once `max_attempts` is exhausted, or [`Error::Cancelled`].
pub async fn retry_on_conflict<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_conflict() => return Err(e),
            Err(e) => {
                if attempt >= max_attempts {
                    warn!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "conflict persisted after max retries"
                    );
                    return Err(e);
                }

                let jittered_delay = config.jittered(delay);
                debug!(
                    operation = %operation_name,
                    attempt,
                    delay_ms = jittered_delay.as_millis(),
                    "write conflicted, retrying from a fresh read"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(jittered_delay) => {}
                }

                delay = config.next_delay(delay);
            }
        }
    }
}
