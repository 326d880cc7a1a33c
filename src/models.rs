use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use validator::{Validate, ValidationError};

use crate::cache::ResultCache;
use crate::config::Config;
use crate::llm::LLMAdapter;
use crate::middleware::{build_rate_limiter, SharedRateLimiter};
use crate::queue::{AnalysisQueue, AnalysisWorker, Job, JobPayload, JobState};
use crate::storage::ResultStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub queue: AnalysisQueue,
    pub cache: ResultCache,
    pub store: Arc<ResultStore>,
    pub pool: Option<PgPool>,
    pub rate_limiter: Option<SharedRateLimiter>,
}

impl AppState {
    /// Wire the pipeline together and start the queue consumer.
    pub fn new(
        config: Config,
        llm: Arc<dyn LLMAdapter>,
        store: Arc<ResultStore>,
        pool: Option<PgPool>,
        shutdown: &CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let analysis = &config.analysis;
        let cache = ResultCache::new(analysis.cache_ttl(), analysis.cache_max_entries);
        let worker = AnalysisWorker::new(
            llm,
            cache.clone(),
            store.clone(),
            config.llm.model.clone(),
            Duration::from_millis(analysis.timeout_ms),
        );
        let (queue, handle) = AnalysisQueue::start(worker, analysis.queue_capacity, shutdown.clone());
        let rate_limiter = build_rate_limiter(&config.rate_limit);

        let state = Self {
            config,
            queue,
            cache,
            store,
            pool,
            rate_limiter,
        };
        (state, handle)
    }
}

/// A finished job's output as persisted by the result store
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: JobPayload,
    pub result: Value,
    pub created_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn for_job(job: &Job, result: Value) -> Self {
        Self {
            id: job.id.clone(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            result,
            created_at: Utc::now(),
        }
    }
}

// API Request/Response types

#[derive(Debug, Clone, serde::Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_submission", skip_on_field_errors = false))]
pub struct AnalysisSubmission {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 64))]
    pub job_type: String,
    #[validate(length(max = 100000))]
    pub text: Option<String>,
    #[validate(url)]
    pub file_url: Option<String>,
    pub params: Option<Value>,
}

impl AnalysisSubmission {
    /// Strip angle brackets and surrounding whitespace; blank fields become absent.
    pub fn sanitized(self) -> Self {
        Self {
            job_type: sanitize(&self.job_type),
            text: self.text.as_deref().map(sanitize).filter(|s| !s.is_empty()),
            file_url: self.file_url.as_deref().map(sanitize).filter(|s| !s.is_empty()),
            params: self.params.filter(|p| !p.is_null()),
        }
    }

    pub fn into_job(self) -> Job {
        Job::new(
            self.job_type,
            JobPayload {
                text: self.text,
                file_url: self.file_url,
                params: self.params,
            },
        )
    }
}

fn sanitize(input: &str) -> String {
    input.replace(['<', '>'], "").trim().to_string()
}

fn validate_submission(submission: &AnalysisSubmission) -> Result<(), ValidationError> {
    if submission.text.is_none() && submission.file_url.is_none() {
        return Err(ValidationError::new("missing_input")
            .with_message("either text or fileUrl is required".into()));
    }
    if let Some(params) = &submission.params {
        if !params.is_object() {
            return Err(ValidationError::new("invalid_params")
                .with_message("params must be a JSON object".into()));
        }
    }
    Ok(())
}

#[derive(Debug, serde::Serialize)]
pub struct SubmissionResponse {
    pub id: String,
    pub status: JobState,
}

#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    pub id: String,
    #[serde(flatten)]
    pub status: crate::queue::JobStatus,
}

#[derive(Debug, serde::Serialize)]
pub struct ResultResponse {
    pub success: bool,
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub result: Value,
    pub created_at: DateTime<Utc>,
}

impl From<ResultRecord> for ResultResponse {
    fn from(record: ResultRecord) -> Self {
        Self {
            success: true,
            id: record.id,
            job_type: record.job_type,
            result: record.result,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ResultListResponse {
    pub success: bool,
    pub items: Vec<ResultRecord>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub storage: String,
    pub queue_depth: usize,
    pub running_jobs: usize,
    pub cache_entries: usize,
    pub pending_replay: usize,
}
