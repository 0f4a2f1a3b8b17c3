//! Rate limiting logic and state management.

mod backend;
mod clock;
mod key;
mod limiter;
mod sweeper;
mod window;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::SessionKey;
pub use limiter::{Decision, LimitConfig, RateLimiter, DEFAULT_LIMIT, DEFAULT_WINDOW};
pub use sweeper::spawn_sweeper;
pub use window::RateWindow;
