//! API Routes
//!
//! - `/api/analysis` - Submit, poll and fetch analysis jobs
//! - `/api/health` - Health checks

pub mod analysis;
pub mod health;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use crate::middleware::{cors_layer, rate_limiter_middleware};
use crate::models::AppState;
use tracing::info;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);
    let limiter = state.rate_limiter.clone();

    Router::new()
        .merge(analysis::router(state.clone()))
        .merge(health::router(state))
        .layer(middleware::from_fn_with_state(limiter, rate_limiter_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
