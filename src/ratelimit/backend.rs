//! Rate limiter trait consumed by the transport layer.

use super::clock::Clock;
use super::limiter::{Decision, RateLimiter};

/// Trait for rate limiter implementations.
///
/// The HTTP service is generic over this trait so handlers can be exercised
/// against a scripted backend as well as the in-memory `RateLimiter`.
pub trait RateLimiterBackend: Send + Sync {
    /// Check the rate limit for a key, recording the action if allowed.
    fn check(&self, key: &str) -> Decision;

    /// Number of keys currently tracked.
    fn tracked_keys(&self) -> usize;
}

impl<C: Clock> RateLimiterBackend for RateLimiter<C> {
    fn check(&self, key: &str) -> Decision {
        RateLimiter::check(self, key)
    }

    fn tracked_keys(&self) -> usize {
        self.len()
    }
}
