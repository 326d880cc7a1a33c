use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use validator::Validate;

use crate::models::{
    AnalysisSubmission, AppState, ListQuery, ResultListResponse, ResultResponse, StatusResponse,
    SubmissionResponse,
};
use crate::queue::JobState;
use crate::types::{AppError, AppResult};

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analysis", post(submit_analysis).get(list_analyses))
        .route("/api/analysis/{id}", get(get_analysis))
        .route("/api/analysis/{id}/status", get(get_analysis_status))
        .with_state(state)
}

/// POST /api/analysis - validate, sanitize and enqueue a job
async fn submit_analysis(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisSubmission>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SubmissionResponse>)> {
    let Json(submission) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let submission = submission.sanitized();
    submission.validate()?;

    let job = submission.into_job();
    info!(job_id = %job.id, job_type = %job.job_type, "Analysis submission received");
    let id = state.queue.enqueue(job).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmissionResponse {
            id,
            status: JobState::Queued,
        }),
    ))
}

/// GET /api/analysis/{id}/status
async fn get_analysis_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    let status = state
        .queue
        .get_status(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("analysis job {}", id)))?;

    Ok(Json(StatusResponse { id, status }))
}

/// GET /api/analysis/{id}
async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ResultResponse>> {
    let record = state
        .store
        .get_result(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("analysis result {}", id)))?;

    Ok(Json(record.into()))
}

/// GET /api/analysis?limit=N - most recent results first
async fn list_analyses(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<ResultListResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let items = state.store.list_results(limit).await;

    Json(ResultListResponse {
        success: true,
        items,
    })
}
