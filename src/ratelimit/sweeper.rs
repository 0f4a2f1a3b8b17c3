//! Background eviction of expired rate windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::RateLimiter;

/// Spawn a task that sweeps expired windows out of `limiter` every `interval`.
///
/// The task exits once `shutdown` changes or its sender is dropped.
pub fn spawn_sweeper<C: Clock + 'static>(
    limiter: Arc<RateLimiter<C>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        info!(interval_ms = interval.as_millis() as u64, "Window sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep_expired();
                    if removed > 0 {
                        debug!(removed = removed, remaining = limiter.len(), "Swept expired rate windows");
                    }
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        info!("Window sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::limiter::LimitConfig;

    #[tokio::test]
    async fn test_sweeper_evicts_and_stops() {
        let clock = ManualClock::new();
        let config = LimitConfig {
            limit: 5,
            window: Duration::from_secs(1),
            max_keys: None,
        };
        let limiter = Arc::new(RateLimiter::with_clock(config, clock.clone()).unwrap());

        limiter.check("a");
        limiter.check("b");
        clock.advance(Duration::from_secs(2));
        limiter.check("c");

        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(limiter.clone(), Duration::from_millis(10), rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.peek("c"), Some(1));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_sender_dropped() {
        let limiter = Arc::new(RateLimiter::new());
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(limiter, Duration::from_secs(60), rx);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
