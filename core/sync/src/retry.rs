//! Retry strategy with exponential backoff for store failures.
//!
//! Only transport errors are retried. Cryptographic and decoding failures
//! are deterministic, so a retry would only repeat them.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::duration_ms;
use sealcal_common::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial delay between retries.
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    /// Maximum delay (cap for exponential growth).
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Add random jitter of +/- 25%
            let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs store operations, retrying transient failures with backoff.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation`, retrying errors for which [`Error::is_retryable`]
    /// holds.
    ///
    /// # Postconditions
    /// - At most `max_retries + 1` attempts are made
    /// - On exhaustion the error of the final attempt is returned
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_condition(operation, Error::is_retryable)
            .await
    }

    /// Run `operation`, retrying errors accepted by `should_retry`.
    pub async fn execute_with_condition<F, Fut, T, C>(
        &self,
        operation: F,
        should_retry: C,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&Error) -> bool,
    {
        let mut attempt = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Store operation recovered");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !should_retry(&err) {
                return Err(err);
            }
            if attempt >= self.config.max_retries {
                warn!(attempts = attempt + 1, "Giving up: {}", err);
                return Err(err);
            }

            let delay = self.config.delay_for_attempt(attempt);
            attempt += 1;
            warn!("Attempt {} failed: {}. Retrying in {:?}", attempt, err, delay);
            sleep(delay).await;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig::new(3)
            .with_initial_delay(Duration::from_secs(1))
            .with_jitter(false);

        let delay0 = config.delay_for_attempt(0);
        let delay1 = config.delay_for_attempt(1);
        let delay2 = config.delay_for_attempt(2);

        assert_eq!(delay0, Duration::from_secs(1));
        assert_eq!(delay1, Duration::from_secs(2));
        assert_eq!(delay2, Duration::from_secs(4));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 10.0,
            ..RetryConfig::new(10)
                .with_initial_delay(Duration::from_secs(1))
                .with_jitter(false)
        };

        // 1 * 10^5 = 100000 seconds, but should be capped at 10
        let delay = config.delay_for_attempt(5);
        assert_eq!(delay, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let executor = RetryExecutor::default();

        let result: Result<i32> = executor.execute(|| async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_on_network_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let config = RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false);
        let executor = RetryExecutor::new(config);

        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    let current = count.fetch_add(1, Ordering::SeqCst);
                    if current < 2 {
                        Err(Error::SyncFailed("503 Service Unavailable".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_authentication_failure_not_retried() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let executor = RetryExecutor::new(RetryConfig::new(5).with_jitter(false));

        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(Error::DecryptionFailed)
                }
            })
            .await;

        assert!(matches!(result, Err(Error::DecryptionFailed)));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_json_uses_milliseconds() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_retries": 5, "initial_delay_ms": 250}"#).unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, RetryConfig::default().max_delay);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let executor = RetryExecutor::default();

        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(Error::MalformedEnvelope("missing field `iv`".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        // Should only try once because decoding errors are not retryable
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_retries_exceeded() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let config = RetryConfig::new(2)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false);
        let executor = RetryExecutor::new(config);

        let result: Result<i32> = executor
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Network("Always fails".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        // Initial + 2 retries = 3 attempts
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_latest_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let config = RetryConfig::new(1)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false);

        let result: Result<i32> = RetryExecutor::new(config)
            .execute(move || {
                let count = count_clone.clone();
                async move {
                    let n = count.fetch_add(1, Ordering::SeqCst);
                    Err(Error::SyncFailed(format!("attempt {}", n)))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::SyncFailed(ref m)) if m == "attempt 1"));
    }

    #[tokio::test]
    async fn test_custom_condition() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let count_clone = attempt_count.clone();

        let executor = RetryExecutor::new(
            RetryConfig::new(2)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        );

        let result: Result<i32> = executor
            .execute_with_condition(
                move || {
                    let count = count_clone.clone();
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        Err(Error::SyncFailed("rejected".to_string()))
                    }
                },
                |_| false,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }
}
