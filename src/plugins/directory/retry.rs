//! Retry manager for directory service calls
//!
//! Transient directory failures (timeouts, refused connections, 5xx) are
//! retried with exponential backoff; anything else is returned immediately.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry manager with exponential backoff support
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    /// Create a new RetryManager with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out
    ///
    /// `operation_name` only labels the log lines.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            let err = match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.config.max_retries {
                warn!(
                    operation = operation_name,
                    attempts = attempt + 1,
                    error = %err,
                    "Directory retries exhausted"
                );
                return Err(err);
            }

            let backoff = self.calculate_backoff(attempt);
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Retrying directory call after transient error"
            );

            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Backoff for a given attempt: initial * multiplier^attempt, capped, optionally jittered
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff_secs as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.config.max_backoff_secs as f64);

        let delay = if self.config.jitter {
            // 50-100% of the capped backoff
            capped * rand::thread_rng().gen_range(0.5..1.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirectoryError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_wait(max_retries: u32) -> RetryManager {
        RetryManager::new(RetryConfig {
            max_retries,
            initial_backoff_secs: 0,
            max_backoff_secs: 0,
            backoff_multiplier: 2.0,
            jitter: false,
        })
    }

    // Test 1: A clone that fails twice with a timeout succeeds on the third try
    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let manager = no_wait(3);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), DirectoryError> = manager
            .execute("clone", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(DirectoryError::NetworkTimeout)
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // Test 2: Gives up after initial attempt + max_retries
    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let manager = no_wait(2);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), DirectoryError> = manager
            .execute("publish", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DirectoryError::ServerError(503))
                }
            })
            .await;

        assert_eq!(result, Err(DirectoryError::ServerError(503)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // Test 3: Unknown repository is not retried
    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let manager = no_wait(5);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), DirectoryError> = manager
            .execute("clone", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DirectoryError::NotFound("widget".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // Test 4: Exponential backoff without jitter, capped at max
    #[test]
    fn test_backoff_growth_and_cap() {
        let manager = RetryManager::new(RetryConfig {
            max_retries: 10,
            initial_backoff_secs: 1,
            max_backoff_secs: 30,
            backoff_multiplier: 2.0,
            jitter: false,
        });

        assert_eq!(manager.calculate_backoff(0), Duration::from_secs(1));
        assert_eq!(manager.calculate_backoff(2), Duration::from_secs(4));
        assert_eq!(manager.calculate_backoff(4), Duration::from_secs(16));
        assert_eq!(manager.calculate_backoff(8), Duration::from_secs(30));
    }

    // Test 5: Jitter keeps backoff within 50-100%
    #[test]
    fn test_jitter_within_range() {
        let manager = RetryManager::new(RetryConfig {
            max_retries: 3,
            initial_backoff_secs: 8,
            max_backoff_secs: 30,
            backoff_multiplier: 2.0,
            jitter: true,
        });

        for _ in 0..50 {
            let backoff = manager.calculate_backoff(0);
            assert!(backoff >= Duration::from_secs(4) && backoff <= Duration::from_secs(8));
        }
    }

    // Test 6: Defaults come from the directory retry config
    #[test]
    fn test_default_configuration() {
        let manager = RetryManager::default();
        assert_eq!(manager.config().max_retries, 3);
        assert_eq!(manager.config().initial_backoff_secs, 1);
        assert_eq!(manager.config().max_backoff_secs, 30);
    }
}
