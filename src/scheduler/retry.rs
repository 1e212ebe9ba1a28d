//! Bounded retry with exponential backoff for scheduler jobs.

use std::future::Future;
use std::time::Duration;

use crate::constants::{JOB_RETRY_INITIAL_DELAY_MS, JOB_RETRY_MAX_DELAY_MS, MAX_JOB_ATTEMPTS};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first run included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_JOB_ATTEMPTS,
            initial_delay: Duration::from_millis(JOB_RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(JOB_RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }
}

/// Final result of a retried operation and how many times it ran.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Execute an async operation, retrying failures that `should_retry` accepts.
///
/// Delays double after each failed attempt, capped at `config.max_delay`.
/// A rejected error or the last allowed attempt ends the loop with that error.
/// The operation always runs at least once.
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(e) => {
                if attempts >= max_attempts || !should_retry(&e) {
                    return Attempted {
                        result: Err(e),
                        attempts,
                    };
                }

                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempts,
                    max_attempts,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;

                // Exponential backoff with cap
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}
