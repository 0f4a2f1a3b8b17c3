//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::RateLimitService;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{RateLimiter, RateLimiterBackend};

/// HTTP server for the rate limit service.
pub struct HttpServer<R: RateLimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Salt for client address keys
    client_salt: String,
}

impl HttpServer<RateLimiter> {
    /// Create a new HTTP server with an in-memory rate limiter.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter>, client_salt: String) -> Self {
        Self::with_backend(addr, rate_limiter, client_salt)
    }
}

impl<R: RateLimiterBackend + 'static> HttpServer<R> {
    /// Create a new HTTP server over any rate limiter backend.
    pub fn with_backend(addr: SocketAddr, rate_limiter: Arc<R>, client_salt: String) -> Self {
        Self {
            addr,
            rate_limiter,
            client_salt,
        }
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending::<()>()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            TurnstileError::Io(e)
        })?;

        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Starting HTTP server for rate limit service");

        let app = RateLimitService::new(self.rate_limiter, self.client_salt).into_router();

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TurnstileError::Server(e.to_string())
        })
    }
}
