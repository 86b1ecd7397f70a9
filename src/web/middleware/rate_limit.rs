//! Rate limiting middleware for mutating endpoints.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use crate::config::RateLimitSettings;
use crate::rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
use crate::web::error::ApiError;

/// Shared state for the upload/delete rate limit.
#[derive(Debug)]
pub struct RateLimitState {
    limiter: RateLimiter,
    /// Honor `X-Forwarded-For` / `X-Real-IP`.
    trust_proxy_headers: bool,
    cleanup_interval: Duration,
}

impl RateLimitState {
    /// Create a new rate limit state from configuration.
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            limiter: RateLimiter::new(RateLimitConfig::from(settings)),
            trust_proxy_headers: settings.trust_proxy_headers,
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_secs.max(1)),
        }
    }

    /// Get the underlying limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Start a background task that drops expired client windows.
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.cleanup_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = self.limiter.cleanup();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired rate limit windows");
                }
            }
        })
    }

    /// Key identifying the client behind `req`.
    pub fn client_key(&self, req: &Request<Body>) -> String {
        if self.trust_proxy_headers {
            if let Some(ip) = forwarded_ip(req) {
                return ip;
            }
        }

        if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
            return addr.ip().to_string();
        }

        "unknown".to_string()
    }
}

/// First address from `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_ip(req: &Request<Body>) -> Option<String> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("X-Forwarded-For").and_then(|v| v.split(',').next()) {
        let first = first.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    header("X-Real-IP").map(str::to_string)
}

/// Rate limiting middleware for upload and delete.
pub async fn mutation_rate_limit(
    state: Arc<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client = state.client_key(&req);

    if let RateLimitResult::Denied { retry_after } = state.limiter.check(&client) {
        tracing::warn!(client = %client, path = %req.uri().path(), "Rate limit exceeded");
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        return ApiError::too_many_requests(secs.max(1)).into_response();
    }

    next.run(req).await
}
