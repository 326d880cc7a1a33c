// Per-job status tracking

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn queued() -> Self {
        Self {
            status: JobState::Queued,
            progress: Some(0),
            error: None,
        }
    }

    pub fn running(progress: u8) -> Self {
        Self {
            status: JobState::Running,
            progress: Some(progress.min(99)),
            error: None,
        }
    }

    pub fn succeeded() -> Self {
        Self {
            status: JobState::Succeeded,
            progress: Some(100),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobState::Failed,
            progress: None,
            error: Some(error.into()),
        }
    }
}

struct StatusEntry {
    status: JobStatus,
    updated_at: Instant,
}

/// Shared map of job id to its latest status.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<String, StatusEntry>>>,
}

impl StatusBoard {
    pub async fn set(&self, id: &str, status: JobStatus) {
        let mut guard = self.inner.write().await;
        guard.insert(
            id.to_string(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub async fn get(&self, id: &str) -> Option<JobStatus> {
        let guard = self.inner.read().await;
        guard.get(id).map(|entry| entry.status.clone())
    }

    pub async fn remove(&self, id: &str) {
        self.inner.write().await.remove(id);
    }

    pub async fn count_in(&self, state: JobState) -> usize {
        let guard = self.inner.read().await;
        guard.values().filter(|e| e.status.status == state).count()
    }

    /// Forget terminal statuses that have not changed for `retention`.
    pub async fn prune_terminal(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, entry| {
            !(entry.status.status.is_terminal()
                && now.duration_since(entry.updated_at) >= retention)
        });
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
