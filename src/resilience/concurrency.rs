//! Per-channel concurrency caps backed by lazily-created semaphores.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Caps the number of concurrent in-flight operations per channel (e.g.
/// `max_concurrent_browsers` per domain, or per-backend request fan-out).
pub struct ChannelLimiter {
    semaphores: DashMap<String, Arc<Semaphore>>,
    max_per_channel: usize,
}

impl ChannelLimiter {
    #[must_use]
    pub fn new(max_per_channel: usize) -> Self {
        Self {
            semaphores: DashMap::new(),
            max_per_channel: max_per_channel.max(1),
        }
    }

    /// Acquires a permit for `channel`, creating its semaphore on first use.
    pub async fn acquire(&self, channel: &str) -> OwnedSemaphorePermit {
        loop {
            let sem = Arc::clone(
                self.semaphores
                    .entry(channel.to_string())
                    .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_channel)))
                    .value(),
            );

            match sem.acquire_owned().await {
                Ok(permit) => return permit,
                Err(_closed) => {
                    // Defensive: semaphore was closed out from under us (never
                    // called in this crate, but cheap to guard against a
                    // future `close()` caller racing with `acquire`).
                    debug!(channel, "semaphore unexpectedly closed, recreating");
                    self.semaphores.remove(channel);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caps_concurrency_per_channel() {
        let limiter = Arc::new(ChannelLimiter::new(1));
        let _first = limiter.acquire("example.com").await;

        let limiter2 = Arc::clone(&limiter);
        let second = tokio::spawn(async move { limiter2.acquire("example.com").await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!second.is_finished());
    }
}
