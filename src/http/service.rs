//! Rate limit HTTP service implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

use crate::ratelimit::{Decision, RateLimiterBackend, SessionKey};

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Body of a session rate check.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Decision as rendered to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub allowed: bool,
    pub remaining: u32,
    /// Milliseconds until the current window expires
    pub reset_in: u64,
}

impl From<Decision> for DecisionBody {
    fn from(decision: Decision) -> Self {
        Self {
            allowed: decision.allowed,
            remaining: decision.remaining,
            reset_in: decision.reset_in_millis(),
        }
    }
}

/// Body returned when a client-keyed check is denied.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitExceededBody {
    pub error: String,
    pub message: String,
    pub reset_in: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBody {
    pub status: String,
    pub timestamp: String,
    pub tracked_keys: usize,
}

/// HTTP front end for a rate limiter backend.
pub struct RateLimitService<R: RateLimiterBackend> {
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Salt for hashing client addresses into keys
    client_salt: String,
}

impl<R: RateLimiterBackend + 'static> RateLimitService<R> {
    /// Create a new RateLimitService with the given rate limiter.
    pub fn new(rate_limiter: Arc<R>, client_salt: impl Into<String>) -> Self {
        Self {
            rate_limiter,
            client_salt: client_salt.into(),
        }
    }

    /// Build the router serving this service.
    pub fn into_router(self) -> Router {
        Router::new()
            .route("/api/rate-limit", post(check_session::<R>))
            .route("/api/rate-limit/client", post(check_client::<R>))
            .route("/health", get(health::<R>))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self))
    }
}

/// Check the limit for a caller-supplied session identifier.
///
/// A denial is still a `200`: callers render it, they do not treat it as a
/// failure.
#[instrument(skip_all)]
async fn check_session<R: RateLimiterBackend>(
    State(service): State<Arc<RateLimitService<R>>>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Response {
    let session_id = match payload {
        Ok(Json(request)) => request.session_id,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected malformed rate limit request");
            None
        }
    };

    let key = match session_id.as_deref().map(SessionKey::new) {
        Some(Ok(key)) => key,
        _ => {
            warn!("Received rate limit request without a session ID");
            return bad_request("Session ID required");
        }
    };

    let decision = service.rate_limiter.check(key.as_str());

    debug!(
        key = %key,
        allowed = decision.allowed,
        remaining = decision.remaining,
        reset_in_ms = decision.reset_in_millis(),
        "Rate limit decision made"
    );

    Json(DecisionBody::from(decision)).into_response()
}

/// Check the limit for the calling client, keyed by its hashed address.
#[instrument(skip_all)]
async fn check_client<R: RateLimiterBackend>(
    State(service): State<Arc<RateLimitService<R>>>,
    request: Request,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let addr = client_addr(request.headers(), peer);
    let key = SessionKey::for_client(&addr, &service.client_salt);

    let decision = service.rate_limiter.check(key.as_str());

    if decision.allowed {
        debug!(key = %key, remaining = decision.remaining, "Client request admitted");
        return (
            [
                (X_RATELIMIT_LIMIT, decision.limit.to_string()),
                (X_RATELIMIT_REMAINING, decision.remaining.to_string()),
            ],
            Json(DecisionBody::from(decision)),
        )
            .into_response();
    }

    let retry_after = decision.reset_in_secs_ceil();
    info!(key = %key, retry_after_secs = retry_after, "Client rate limit exceeded");

    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (X_RATELIMIT_REMAINING, "0".to_string()),
            (X_RATELIMIT_RESET, retry_after.to_string()),
            (axum::http::header::RETRY_AFTER, retry_after.to_string()),
        ],
        Json(LimitExceededBody {
            error: "Rate limit exceeded".to_string(),
            message: format!(
                "Maximum {} requests per window. Try again in {}s.",
                decision.limit, retry_after
            ),
            reset_in: decision.reset_in_millis(),
        }),
    )
        .into_response()
}

async fn health<R: RateLimiterBackend>(
    State(service): State<Arc<RateLimitService<R>>>,
) -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        tracked_keys: service.rate_limiter.tracked_keys(),
    })
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Resolve the client address: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer.
fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(',').next().unwrap_or("").trim().to_string())
            .filter(|value| !value.is_empty())
    };

    header(&X_FORWARDED_FOR)
        .or_else(|| header(&X_REAL_IP))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
