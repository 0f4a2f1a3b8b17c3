//! Per-key counting window.

use std::time::{Duration, Instant};

/// The state tracked for one key: how many actions were admitted in the
/// current window and when that window ends.
///
/// A window whose `reset_at` is at or before `now` is expired and must be
/// treated as if it did not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Admitted actions in this window, always within `1..=limit`
    count: u32,
    /// Instant at which the window expires
    reset_at: Instant,
}

impl RateWindow {
    /// Open a fresh window at `now` with one action already recorded.
    pub fn start(now: Instant, duration: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + duration,
        }
    }

    /// Number of actions recorded in this window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Instant at which this window expires.
    pub fn reset_at(&self) -> Instant {
        self.reset_at
    }

    /// Whether the window has run out at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }

    /// Record one more action if the window still has quota.
    ///
    /// Returns `false` and leaves the window untouched when `limit` has
    /// already been reached.
    pub fn try_admit(&mut self, limit: u32) -> bool {
        if self.count < limit {
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Quota left under `limit`.
    pub fn remaining(&self, limit: u32) -> u32 {
        limit.saturating_sub(self.count)
    }

    /// Time left until the window expires, zero once it has.
    pub fn reset_in(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_records_one_action() {
        let now = Instant::now();
        let window = RateWindow::start(now, Duration::from_secs(180));

        assert_eq!(window.count(), 1);
        assert_eq!(window.reset_at(), now + Duration::from_secs(180));
        assert_eq!(window.remaining(5), 4);
    }

    #[test]
    fn test_try_admit_stops_at_limit() {
        let now = Instant::now();
        let mut window = RateWindow::start(now, Duration::from_secs(1));

        assert!(window.try_admit(3));
        assert!(window.try_admit(3));
        assert_eq!(window.count(), 3);

        // Rejected admission leaves the count alone
        assert!(!window.try_admit(3));
        assert_eq!(window.count(), 3);
        assert_eq!(window.remaining(3), 0);
    }

    #[test]
    fn test_expiry_is_inclusive_of_reset_instant() {
        let now = Instant::now();
        let window = RateWindow::start(now, Duration::from_millis(500));

        assert!(!window.is_expired(now));
        assert!(!window.is_expired(now + Duration::from_millis(499)));
        assert!(window.is_expired(now + Duration::from_millis(500)));
    }

    #[test]
    fn test_reset_in_saturates() {
        let now = Instant::now();
        let window = RateWindow::start(now, Duration::from_secs(10));

        assert_eq!(window.reset_in(now + Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(window.reset_in(now + Duration::from_secs(30)), Duration::ZERO);
    }
}
