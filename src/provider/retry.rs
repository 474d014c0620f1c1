//! Retry helper for provider calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{AsahiError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Exponential backoff: `initial_delay * 2^attempt`, capped at
/// `max_delay`. The gateway's provider path uses three attempts with
/// delays of 1s, 2s, 4s.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the initial request.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on exponential growth.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retrying attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

/// Execute an async operation with retry on transient errors.
///
/// Permanent errors (validation, registry misses, configuration) are
/// returned immediately without retry.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    provider_name: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < config.max_attempts {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        provider = provider_name,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| AsahiError::Provider("no attempts were made".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig::default().max_delay(Duration::from_secs(3));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(3));
    }
}
