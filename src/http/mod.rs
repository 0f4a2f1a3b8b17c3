//! HTTP module exposing the rate limiter to request handlers.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{CheckRequest, DecisionBody, ErrorBody, HealthBody, LimitExceededBody, RateLimitService};
