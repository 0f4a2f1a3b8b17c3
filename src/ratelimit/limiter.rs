//! Core rate limiter implementation.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::window::RateWindow;
use crate::error::{Result, TurnstileError};

/// Default number of actions admitted per window.
pub const DEFAULT_LIMIT: u32 = 5;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3 * 60);

/// Configuration for a rate limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum actions admitted per window
    pub limit: u32,
    /// Length of a window
    pub window: Duration,
    /// Upper bound on tracked keys, unbounded when `None`
    pub max_keys: Option<usize>,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            max_keys: None,
        }
    }
}

impl LimitConfig {
    /// Reject configurations the limiter cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(TurnstileError::Config("limit must be at least 1".into()));
        }
        if self.window.is_zero() {
            return Err(TurnstileError::Config("window must be non-zero".into()));
        }
        if self.max_keys == Some(0) {
            return Err(TurnstileError::Config("max_keys must be at least 1".into()));
        }
        Ok(())
    }
}

/// Outcome of a single rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the caller may act now
    pub allowed: bool,
    /// The configured per-window limit
    pub limit: u32,
    /// Quota left in the current window
    pub remaining: u32,
    /// Time until the current window expires
    pub reset_in: Duration,
}

impl Decision {
    /// `reset_in` in whole milliseconds.
    pub fn reset_in_millis(&self) -> u64 {
        self.reset_in.as_millis() as u64
    }

    /// `reset_in` rounded up to whole seconds, as used by `Retry-After`.
    pub fn reset_in_secs_ceil(&self) -> u64 {
        let secs = self.reset_in.as_secs();
        if self.reset_in.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Fixed-window rate limiter keyed by session identifier.
///
/// Windows live in a sharded concurrent map. The entry guard for a key holds
/// its shard lock across lookup, expiry test and increment, so concurrent
/// checks on one key can never admit more than `limit` actions per window,
/// while keys on other shards proceed in parallel.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Active windows indexed by key
    windows: DashMap<String, RateWindow>,
    config: LimitConfig,
    clock: C,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            config: LimitConfig::default(),
            clock: SystemClock,
        }
    }

    /// Create a rate limiter from a configuration.
    pub fn with_config(config: LimitConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter that reads time from `clock`.
    pub fn with_clock(config: LimitConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            windows: DashMap::new(),
            config,
            clock,
        })
    }

    /// Decide whether `key` may act now, recording the action if so.
    ///
    /// A denied check does not touch stored state, so hitting the limit never
    /// pushes the reset further out.
    pub fn check(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let limit = self.config.limit;

        trace!(key = %key, "Checking rate limit");

        if let Some(max_keys) = self.config.max_keys {
            // Must run before the entry guard below is taken.
            if self.windows.len() >= max_keys && !self.windows.contains_key(key) {
                self.make_room(now, max_keys);
            }
        }

        match self.windows.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                debug!(key = %key, limit = limit, window = ?self.config.window, "Opening rate window");
                vacant.insert(RateWindow::start(now, self.config.window));
                self.fresh_decision()
            }
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();

                if window.is_expired(now) {
                    debug!(key = %key, "Rate window expired, opening a new one");
                    *window = RateWindow::start(now, self.config.window);
                    return self.fresh_decision();
                }

                if window.try_admit(limit) {
                    Decision {
                        allowed: true,
                        limit,
                        remaining: window.remaining(limit),
                        reset_in: window.reset_in(now),
                    }
                } else {
                    let reset_in = window.reset_in(now);
                    debug!(key = %key, reset_in_ms = reset_in.as_millis() as u64, "Rate limit exceeded");
                    Decision {
                        allowed: false,
                        limit,
                        remaining: 0,
                        reset_in,
                    }
                }
            }
        }
    }

    /// Count recorded for `key` in its current window.
    ///
    /// Returns `None` if the key has no unexpired window.
    pub fn peek(&self, key: &str) -> Option<u32> {
        let now = self.clock.now();
        self.windows
            .get(key)
            .filter(|window| !window.is_expired(now))
            .map(|window| window.count())
    }

    /// Drop every expired window, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_at(self.clock.now())
    }

    /// Clear all windows.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Get the number of tracked keys, expired or not.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Get the per-window limit.
    pub fn limit(&self) -> u32 {
        self.config.limit
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.config.window
    }

    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    fn fresh_decision(&self) -> Decision {
        Decision {
            allowed: true,
            limit: self.config.limit,
            remaining: self.config.limit - 1,
            reset_in: self.config.window,
        }
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Free a slot for a new key in a full store.
    ///
    /// Expired windows go first. If none were expired, the window closest to
    /// expiry is evicted and its key starts over on its next request.
    fn make_room(&self, now: Instant, max_keys: usize) {
        let swept = self.sweep_at(now);
        if self.windows.len() < max_keys {
            debug!(swept = swept, "Swept expired windows to make room");
            return;
        }

        let victim = self
            .windows
            .iter()
            .min_by_key(|entry| entry.value().reset_at())
            .map(|entry| entry.key().clone());

        if let Some(victim) = victim {
            warn!(
                key = %victim,
                max_keys = max_keys,
                "Key capacity reached, evicting active window"
            );
            self.windows.remove(&victim);
        }
    }
}
