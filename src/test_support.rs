// Test doubles shared by the queue and route tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::llm::LLMAdapter;
use crate::queue::{AnalysisQueue, JobState, JobStatus};
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

/// Scripted LLM: replies with fixed content, records the user message of
/// every call, and misbehaves on user messages containing marker strings.
pub struct StubLLM {
    content: String,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
    hang: bool,
}

pub const FAIL_MARKER: &str = "[fail]";
pub const PANIC_MARKER: &str = "[panic]";

impl StubLLM {
    pub fn replying(content: &str) -> Self {
        Self {
            content: content.to_string(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            gate: None,
            hang: false,
        }
    }

    /// Calls block until [`StubLLM::release`] hands out permits.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Calls only return once their abort signal fires.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMAdapter for StubLLM {
    async fn create_chat_completion(
        &self,
        request: &LLMRequest,
        signal: Option<&CancellationToken>,
    ) -> AppResult<LLMResponse> {
        let user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(user.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.hang {
            match signal {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending::<()>().await,
            }
            return Err(AppError::Aborted);
        }
        if user.contains(PANIC_MARKER) {
            panic!("stub exploded");
        }
        if user.contains(FAIL_MARKER) {
            return Err(AppError::LLMApi("500 Internal Server Error: upstream unavailable".to_string()));
        }

        Ok(LLMResponse {
            content: self.content.clone(),
            finish_reason: "stop".to_string(),
            model: request.model.clone(),
            created: 1_700_000_000,
            usage: TokenUsage::default(),
        })
    }
}

/// Defaults with no database, no API key and no rate limit.
pub fn test_config() -> Config {
    let mut config = Config::from_vars(|_| None).unwrap();
    config.rate_limit.requests_per_minute = 0;
    config
}

pub async fn wait_for_status(queue: &AnalysisQueue, id: &str, done: impl Fn(&JobStatus) -> bool) -> JobStatus {
    for _ in 0..400 {
        if let Some(status) = queue.get_status(id).await {
            if done(&status) {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} did not reach the expected status", id);
}

pub async fn wait_for_terminal(queue: &AnalysisQueue, id: &str) -> JobStatus {
    wait_for_status(queue, id, |s| s.status.is_terminal()).await
}

pub async fn wait_for_running(queue: &AnalysisQueue, id: &str) -> JobStatus {
    wait_for_status(queue, id, |s| s.status == JobState::Running).await
}
