//! Exponential backoff with jitter for retrying transient failures.

use rand::Rng;
use std::time::Duration;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 60_000;
const JITTER_PERCENT: f64 = 0.2;
const MAX_ATTEMPTS: u8 = 3;

/// Configuration for a backoff schedule. Defaults match the min/max/factor
/// used for both LLM backend retries and scrape-step retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_percent: f64,
    pub max_attempts: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            jitter_percent: JITTER_PERCENT,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl BackoffConfig {
    #[must_use]
    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`, jittered by +/- `jitter_percent`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u8) -> Duration {
        let exp_delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(1 << attempt.min(10));
        let capped_ms = exp_delay_ms.min(self.max_delay.as_millis() as u64);

        let jitter = rand::rng().random_range(-self.jitter_percent..=self.jitter_percent);
        let jittered_ms = (capped_ms as f64 * (1.0 + jitter)).max(0.0) as u64;

        Duration::from_millis(jittered_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Retries `op` up to `config.max_attempts` times, sleeping with jittered
/// exponential backoff between attempts. Returns the last error if every
/// attempt fails.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &BackoffConfig, mut op: F) -> Result<T, E>
where
    F: FnMut(u8) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0u8;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 >= config.max_attempts {
                    return Err(err);
                }
                tokio::time::sleep(config.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let cfg = BackoffConfig::default();
        let first = cfg.delay_for_attempt(0);
        let later = cfg.delay_for_attempt(8);
        assert!(first.as_millis() <= cfg.max_delay.as_millis());
        assert!(later.as_millis() <= cfg.max_delay.as_millis());
    }

    #[tokio::test]
    async fn retry_with_backoff_gives_up_after_max_attempts() {
        let cfg = BackoffConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_percent: 0.0,
            max_attempts: 3,
        };
        let mut calls = 0;
        let result: Result<(), &str> = retry_with_backoff(&cfg, |_attempt| {
            calls += 1;
            async { Err("boom") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
