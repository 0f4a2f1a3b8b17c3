//! Turnstile - Per-Session Rate Limiting Service
//!
//! This crate implements an in-memory, fixed-window rate limiter that bounds
//! how often a session may invoke an expensive downstream operation, and
//! exposes it to request handlers over HTTP.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
