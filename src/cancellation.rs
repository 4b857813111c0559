//! Cooperative cancellation for long-running scrape and pipeline tasks.
//!
//! A thin wrapper over `tokio::sync::watch`, mirroring the zero-cost newtype
//! style used for the channel wrappers elsewhere in this crate: the token
//! itself carries no logic, it just exposes an ergonomic, cheaply-cloneable
//! handle that async code can `select!` against.

use tokio::sync::watch;

/// Handle used to request cancellation. Cloning is cheap (`Arc` internally
/// via `watch::Sender`).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    /// Runs `fut` to completion unless cancellation is requested first.
    /// Returns `None` if the token was cancelled before `fut` finished.
    pub async fn run_until_cancelled<F, T>(&self, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_observed() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }

    #[tokio::test]
    async fn run_until_cancelled_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result = token
            .run_until_cancelled(async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                42
            })
            .await;
        assert_eq!(result, None);
    }
}
