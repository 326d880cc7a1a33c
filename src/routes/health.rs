use axum::{extract::State, routing::get, Json, Router};
use crate::db;
use crate::models::{AppState, HealthResponse};
use crate::queue::JobState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.pool {
        Some(pool) => match db::health_check(pool).await {
            Ok(_) => "connected",
            Err(_) => "unreachable",
        },
        None => "not configured",
    };

    let response = HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: database.to_string(),
        storage: state.store.mode().to_string(),
        queue_depth: state.queue.depth(),
        running_jobs: state.queue.statuses().count_in(JobState::Running).await,
        cache_entries: state.cache.len().await,
        pending_replay: state.store.pending_replay_len().await,
    };

    Json(response)
}
