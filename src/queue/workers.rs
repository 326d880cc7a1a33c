// Analysis worker: one job in, one stored result out

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::analysis::{build_messages, format_result};
use crate::cache::{cache_key, ResultCache};
use crate::llm::LLMAdapter;
use crate::models::ResultRecord;
use crate::queue::jobs::Job;
use crate::queue::status::{JobStatus, StatusBoard};
use crate::storage::ResultStore;
use crate::types::{AppError, AppResult, LLMRequest};

pub struct AnalysisWorker {
    llm: Arc<dyn LLMAdapter>,
    cache: ResultCache,
    store: Arc<ResultStore>,
    default_model: String,
    timeout: Duration,
}

impl AnalysisWorker {
    pub fn new(
        llm: Arc<dyn LLMAdapter>,
        cache: ResultCache,
        store: Arc<ResultStore>,
        default_model: String,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            cache,
            store,
            default_model,
            timeout,
        }
    }

    /// Run a job to completion: answer from cache when possible, otherwise
    /// call the LLM, then cache and store the formatted result.
    ///
    /// The LLM call is aborted after the configured timeout, or as soon as
    /// `shutdown` fires.
    pub async fn process(
        &self,
        job: &Job,
        statuses: &StatusBoard,
        shutdown: &CancellationToken,
    ) -> AppResult<()> {
        let payload = &job.payload;
        let key = cache_key(
            &job.job_type,
            payload.text.as_deref(),
            payload.file_url.as_deref(),
            payload.params.as_ref(),
        );

        // A hit is stored under this job's own id; the entry's TTL is left as is.
        if let Some(cached) = self.cache.get(&key).await {
            debug!(job_id = %job.id, "Analysis served from cache");
            self.store.save_result(ResultRecord::for_job(job, cached)).await;
            return Ok(());
        }

        let request = LLMRequest {
            model: payload
                .model_override()
                .unwrap_or(&self.default_model)
                .to_string(),
            messages: build_messages(&job.job_type, payload),
            max_tokens: None,
            temperature: None,
        };

        let signal = shutdown.child_token();
        let timer = {
            let signal = signal.clone();
            let timeout = self.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                signal.cancel();
            })
        };
        let outcome = self.llm.create_chat_completion(&request, Some(&signal)).await;
        timer.abort();

        let response = match outcome {
            Err(AppError::Aborted) if !shutdown.is_cancelled() => {
                return Err(AppError::Timeout(self.timeout.as_millis() as u64));
            }
            other => other?,
        };
        statuses.set(&job.id, JobStatus::running(90)).await;

        info!(
            job_id = %job.id,
            model = %response.model,
            total_tokens = response.usage.total_tokens,
            "LLM analysis completed"
        );

        let result = format_result(&job.job_type, &response);
        self.cache.set(key, result.clone(), None).await;
        self.store.save_result(ResultRecord::for_job(job, result)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::jobs::JobPayload;
    use crate::test_support::StubLLM;
    use serde_json::json;

    fn worker(llm: Arc<StubLLM>, cache: ResultCache, store: Arc<ResultStore>, timeout: Duration) -> AnalysisWorker {
        AnalysisWorker::new(llm, cache, store, "default-model".to_string(), timeout)
    }

    async fn run_hello(worker: &AnalysisWorker) {
        let job = Job::new("summary", JobPayload::text("Hello"));
        worker
            .process(&job, &StatusBoard::default(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cache_miss_calls_llm_and_stores_result() {
        let llm = Arc::new(StubLLM::replying("Mock result"));
        let cache = ResultCache::new(Duration::from_secs(300), 100);
        let store = Arc::new(ResultStore::local_only(100));
        let worker = worker(llm.clone(), cache.clone(), store.clone(), Duration::from_secs(5));

        let job = Job::new("summary", JobPayload::text("Hello"));
        worker
            .process(&job, &StatusBoard::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(llm.calls(), 1);
        let record = store.get_result(&job.id).await.unwrap();
        assert_eq!(record.result["data"]["content"], json!("Mock result"));
        assert_eq!(record.result["metadata"]["model"], json!("default-model"));

        let key = cache_key("summary", Some("Hello"), None, None);
        assert_eq!(cache.get(&key).await, Some(record.result));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_llm() {
        let llm = Arc::new(StubLLM::replying("fresh"));
        let cache = ResultCache::new(Duration::from_secs(300), 100);
        let store = Arc::new(ResultStore::local_only(100));
        let worker = worker(llm.clone(), cache.clone(), store.clone(), Duration::from_secs(5));

        let cached = json!({"success": true, "data": {"content": "cached", "type": "summary"}});
        cache
            .set(cache_key("summary", Some("Hello"), None, None), cached.clone(), None)
            .await;

        let job = Job::new("summary", JobPayload::text("Hello"));
        worker
            .process(&job, &StatusBoard::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(llm.calls(), 0);
        assert_eq!(store.get_result(&job.id).await.unwrap().result, cached);
    }

    #[tokio::test]
    async fn test_different_file_urls_do_not_share_results() {
        let llm = Arc::new(StubLLM::replying("document analysis"));
        let store = Arc::new(ResultStore::local_only(100));
        let worker = worker(
            llm.clone(),
            ResultCache::new(Duration::from_secs(300), 100),
            store.clone(),
            Duration::from_secs(5),
        );

        let url_job = |url: &str| {
            Job::new(
                "summary",
                JobPayload {
                    file_url: Some(url.to_string()),
                    ..Default::default()
                },
            )
        };
        let first = url_job("https://a.example/one.pdf");
        let second = url_job("https://b.example/two.pdf");
        for job in [&first, &second] {
            worker
                .process(job, &StatusBoard::default(), &CancellationToken::new())
                .await
                .unwrap();
        }

        assert_eq!(llm.calls(), 2);
        let seen = llm.seen();
        assert!(seen[0].contains("https://a.example/one.pdf"));
        assert!(seen[1].contains("https://b.example/two.pdf"));
        assert!(store.get_result(&second.id).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_entry_calls_llm_again() {
        let llm = Arc::new(StubLLM::replying("Mock result"));
        let worker = worker(
            llm.clone(),
            ResultCache::new(Duration::from_secs(300), 100),
            Arc::new(ResultStore::local_only(100)),
            Duration::from_secs(5),
        );

        run_hello(&worker).await;
        assert_eq!(llm.calls(), 1);

        // a hit inside the TTL does not extend it
        tokio::time::advance(Duration::from_secs(299)).await;
        run_hello(&worker).await;
        assert_eq!(llm.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        run_hello(&worker).await;
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_model_override_from_params() {
        let llm = Arc::new(StubLLM::replying("ok"));
        let store = Arc::new(ResultStore::local_only(100));
        let worker = worker(
            llm,
            ResultCache::new(Duration::from_secs(300), 100),
            store.clone(),
            Duration::from_secs(5),
        );

        let job = Job::new(
            "summary",
            JobPayload {
                text: Some("Hello".to_string()),
                params: Some(json!({"model": "gpt-4o"})),
                ..Default::default()
            },
        );
        worker
            .process(&job, &StatusBoard::default(), &CancellationToken::new())
            .await
            .unwrap();

        let record = store.get_result(&job.id).await.unwrap();
        assert_eq!(record.result["metadata"]["model"], json!("gpt-4o"));
    }

    #[tokio::test]
    async fn test_timeout_aborts_llm_call() {
        let llm = Arc::new(StubLLM::replying("never").hanging());
        let store = Arc::new(ResultStore::local_only(100));
        let worker = worker(
            llm,
            ResultCache::new(Duration::from_secs(300), 100),
            store.clone(),
            Duration::from_millis(30),
        );

        let job = Job::new("summary", JobPayload::text("slow"));
        let err = worker
            .process(&job, &StatusBoard::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout(30)));
        assert!(store.get_result(&job.id).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_llm_call() {
        let llm = Arc::new(StubLLM::replying("never").hanging());
        let worker = worker(
            llm,
            ResultCache::new(Duration::from_secs(300), 100),
            Arc::new(ResultStore::local_only(100)),
            Duration::from_secs(60),
        );

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let job = Job::new("summary", JobPayload::text("slow"));
        let err = worker
            .process(&job, &StatusBoard::default(), &shutdown)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Aborted));
    }
}
