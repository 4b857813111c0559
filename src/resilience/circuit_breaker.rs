//! Tri-state circuit breaker, keyed by an arbitrary channel identifier.
//!
//! Used both for LLM backends (keyed by backend name) and for scrape targets
//! (keyed by domain), tracking consecutive failures and short-circuiting a
//! channel that has become consistently unhealthy.
//!
//! Transitions: CLOSED -> OPEN once `consecutive_failures` reaches
//! `failure_threshold`. OPEN -> HALF-OPEN once `recovery_timeout` has
//! elapsed, admitting exactly one trial call; every other caller is failed
//! fast while that trial is in flight. HALF-OPEN -> CLOSED on the trial's
//! success, or back to OPEN on its failure.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

#[derive(Debug, Clone)]
pub struct ChannelHealth {
    pub consecutive_failures: u32,
    pub total_attempts: u32,
    pub total_successes: u32,
    pub last_success: Option<Instant>,
    pub last_opened: Option<Instant>,
    /// Whether the single HALF-OPEN trial call has already been handed out.
    pub half_open_trial_in_flight: bool,
    pub state: CircuitState,
}

impl ChannelHealth {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            total_attempts: 0,
            total_successes: 0,
            last_success: None,
            last_opened: None,
            half_open_trial_in_flight: false,
            state: CircuitState::Closed,
        }
    }
}

/// Circuit breaker tracking health per channel (LLM backend, scrape domain, ...).
pub struct CircuitBreaker {
    channels: DashMap<String, ChannelHealth>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self { channels: DashMap::new(), failure_threshold, recovery_timeout }
    }

    /// Returns true if a request on `channel` should proceed. In HALF-OPEN,
    /// only the first caller after the timeout gets `true`; everyone else is
    /// failed fast until the trial resolves via `record_success`/`record_failure`.
    pub fn should_attempt(&self, channel: &str) -> bool {
        let mut health = self.channels.entry(channel.to_string()).or_insert_with(ChannelHealth::new);

        match health.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let Some(opened) = health.last_opened else {
                    debug!(channel, "circuit open with no timestamp, staying open");
                    return false;
                };
                if opened.elapsed() < self.recovery_timeout {
                    return false;
                }
                health.state = CircuitState::HalfOpen;
                health.half_open_trial_in_flight = true;
                info!(channel, elapsed_secs = opened.elapsed().as_secs(), "circuit half-open, admitting trial");
                true
            }
            CircuitState::HalfOpen => {
                if health.half_open_trial_in_flight {
                    false
                } else {
                    health.half_open_trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self, channel: &str) {
        if let Some(mut health) = self.channels.get_mut(channel) {
            health.total_successes += 1;
            health.total_attempts += 1;
            health.last_success = Some(Instant::now());

            match health.state {
                CircuitState::HalfOpen => {
                    health.state = CircuitState::Closed;
                    health.consecutive_failures = 0;
                    health.half_open_trial_in_flight = false;
                    info!(channel, "circuit closed after successful trial");
                }
                CircuitState::Closed => health.consecutive_failures = 0,
                CircuitState::Open => {}
            }
        }
    }

    pub fn record_failure(&self, channel: &str, error: &str) {
        let mut health = self.channels.entry(channel.to_string()).or_insert_with(ChannelHealth::new);
        health.total_attempts += 1;

        match health.state {
            CircuitState::HalfOpen => {
                health.state = CircuitState::Open;
                health.last_opened = Some(Instant::now());
                health.half_open_trial_in_flight = false;
                warn!(channel, error, "trial failed, circuit re-opened");
            }
            CircuitState::Closed => {
                health.consecutive_failures += 1;
                if health.consecutive_failures >= self.failure_threshold {
                    health.state = CircuitState::Open;
                    health.last_opened = Some(Instant::now());
                    warn!(channel, consecutive_failures = health.consecutive_failures, error, "circuit open");
                } else {
                    debug!(
                        channel,
                        consecutive_failures = health.consecutive_failures,
                        threshold = self.failure_threshold,
                        error,
                        "circuit failure recorded"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    #[must_use]
    pub fn get_health(&self, channel: &str) -> Option<ChannelHealth> {
        self.channels.get(channel).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn open_channels(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|entry| entry.value().state == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_by_default_and_tracks_success() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(cb.should_attempt("openai"));
        cb.record_success("openai");
        let health = cb.get_health("openai").unwrap();
        assert_eq!(health.state, CircuitState::Closed);
        assert_eq!(health.total_successes, 1);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            cb.record_failure("openai", "timeout");
        }
        assert_eq!(cb.get_health("openai").unwrap().state, CircuitState::Open);
        assert!(!cb.should_attempt("openai"));
    }

    #[test]
    fn half_opens_after_timeout_and_admits_one_trial() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(50));
        cb.record_failure("openai", "e");
        cb.record_failure("openai", "e");
        assert_eq!(cb.get_health("openai").unwrap().state, CircuitState::Open);
        std::thread::sleep(Duration::from_millis(80));
        assert!(cb.should_attempt("openai"));
        assert_eq!(cb.get_health("openai").unwrap().state, CircuitState::HalfOpen);
        // A second caller arriving while the trial is outstanding is failed fast.
        assert!(!cb.should_attempt("openai"));
    }

    #[test]
    fn single_trial_success_closes_the_circuit() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure("openai", "e");
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.should_attempt("openai"));
        cb.record_success("openai");
        assert_eq!(cb.get_health("openai").unwrap().state, CircuitState::Closed);
    }

    #[test]
    fn trial_failure_reopens_the_circuit() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure("openai", "e");
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.should_attempt("openai"));
        cb.record_failure("openai", "still broken");
        assert_eq!(cb.get_health("openai").unwrap().state, CircuitState::Open);
    }
}
