// Global request rate limiting with governor

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::types::AppError;

pub type SharedRateLimiter = Arc<DefaultDirectRateLimiter>;

/// `None` when the configured rate is 0 (disabled).
pub fn build_rate_limiter(config: &RateLimitConfig) -> Option<SharedRateLimiter> {
    NonZeroU32::new(config.requests_per_minute)
        .map(|rate| Arc::new(RateLimiter::direct(Quota::per_minute(rate))))
}

pub async fn rate_limiter_middleware(
    State(limiter): State<Option<SharedRateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(limiter) = &limiter {
        if limiter.check().is_err() {
            warn!(path = %req.uri().path(), "Rate limit exceeded");
            return Err(AppError::RateLimited);
        }
    }
    Ok(next.run(req).await)
}
