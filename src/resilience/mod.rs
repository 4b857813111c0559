//! Shared resilience primitives used by both the LLM orchestrator (C1) and
//! the scraping runtime (C2): circuit breakers, rate limiting, concurrency
//! caps, and retry backoff. Each is keyed by an arbitrary "channel" string
//! (a backend name or a domain) so the same implementation serves both call
//! sites.

pub mod backoff;
pub mod circuit_breaker;
pub mod concurrency;
pub mod rate_limiter;

pub use backoff::{retry_with_backoff, BackoffConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitState, ChannelHealth};
pub use concurrency::ChannelLimiter;
pub use rate_limiter::{RateLimitDecision, RateLimiter};
