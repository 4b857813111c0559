//! Per-channel token-bucket rate limiter: `acquire(channel)` blocks until a
//! token is available; passing a new `rate_per_sec` on the next call updates
//! the refill rate in place. One bucket per logical channel — LLM backend
//! name or scrape-target domain share the same mechanism.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Deny { retry_after: Duration },
}

/// Floating-point token bucket: `tokens` accrues at `rate_per_sec` up to a
/// one-second burst cap, consumed one at a time. Every call re-supplies
/// `rate_per_sec`, which doubles as `SetRate` — a channel whose configured
/// rate changes takes effect on its very next `check`/`acquire`.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: f64) -> Self {
        Self { tokens: rate_per_sec.max(1.0), last_refill: Instant::now() }
    }

    fn refill(&mut self, rate_per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let burst_cap = rate_per_sec.max(1.0);
        self.tokens = (self.tokens + elapsed * rate_per_sec).min(burst_cap);
        self.last_refill = now;
    }

    fn try_consume(&mut self, rate_per_sec: f64) -> RateLimitDecision {
        let now = Instant::now();
        self.refill(rate_per_sec, now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return RateLimitDecision::Allow;
        }

        let deficit = 1.0 - self.tokens;
        let retry_secs = if rate_per_sec > 0.0 { deficit / rate_per_sec } else { 1.0 };
        RateLimitDecision::Deny { retry_after: Duration::from_secs_f64(retry_secs.max(0.0)) }
    }
}

/// Per-channel rate limiter; minimum inter-call interval on a channel is
/// `1 / rate_per_sec`.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self { buckets: Mutex::new(HashMap::new()) }
    }

    /// Non-blocking: returns immediately with `Allow` or a `Deny` carrying
    /// how long the caller should wait before retrying.
    #[must_use]
    pub fn check(&self, channel: &str, rate_per_sec: f64) -> RateLimitDecision {
        if rate_per_sec <= 0.0 {
            return RateLimitDecision::Allow;
        }
        let mut buckets = self.buckets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        buckets.entry(channel.to_string()).or_insert_with(|| TokenBucket::new(rate_per_sec)).try_consume(rate_per_sec)
    }

    /// Blocking: sleeps (without holding the bucket lock across the sleep)
    /// until `channel` has a free token.
    pub async fn acquire(&self, channel: &str, rate_per_sec: f64) {
        loop {
            match self.check(channel, rate_per_sec) {
                RateLimitDecision::Allow => return,
                RateLimitDecision::Deny { retry_after } => tokio::time::sleep(retry_after).await,
            }
        }
    }

    pub fn clear(&self) {
        self.buckets.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.buckets.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_allowed_second_denied() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.check("openai", 1.0), RateLimitDecision::Allow);
        assert!(matches!(limiter.check("openai", 1.0), RateLimitDecision::Deny { .. }));
    }

    #[test]
    fn zero_rate_never_denies() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.check("disabled", 0.0), RateLimitDecision::Allow);
        assert_eq!(limiter.check("disabled", 0.0), RateLimitDecision::Allow);
    }

    #[tokio::test]
    async fn acquire_eventually_returns() {
        let limiter = RateLimiter::new();
        limiter.acquire("openai", 50.0).await;
        limiter.acquire("openai", 50.0).await;
    }

    #[test]
    fn channels_are_independent() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.check("a", 1.0), RateLimitDecision::Allow);
        assert_eq!(limiter.check("b", 1.0), RateLimitDecision::Allow);
    }
}
