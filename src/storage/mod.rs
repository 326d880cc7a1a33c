//! Result storage
//!
//! Finished results go to the external store (PostgreSQL) when one is
//! configured. When it is not, or when an external write fails, the record is
//! appended to a bounded process-local list instead. Records that landed
//! locally because of a failed external write are also queued for replay, so
//! the external store catches up once it is reachable again.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::models::ResultRecord;
use crate::types::AppResult;

/// Durable backend for finished results.
#[async_trait]
pub trait ExternalResultStore: Send + Sync {
    async fn save(&self, record: &ResultRecord) -> AppResult<()>;
    async fn get(&self, id: &str) -> AppResult<Option<ResultRecord>>;
    /// Most recent first.
    async fn list(&self, limit: usize) -> AppResult<Vec<ResultRecord>>;
}

pub struct ResultStore {
    external: Option<Arc<dyn ExternalResultStore>>,
    local: RwLock<VecDeque<ResultRecord>>,
    pending_replay: Mutex<VecDeque<ResultRecord>>,
    max_local: usize,
}

impl ResultStore {
    pub fn local_only(max_local: usize) -> Self {
        Self {
            external: None,
            local: RwLock::new(VecDeque::new()),
            pending_replay: Mutex::new(VecDeque::new()),
            max_local: max_local.max(1),
        }
    }

    pub fn with_external(external: Arc<dyn ExternalResultStore>, max_local: usize) -> Self {
        Self {
            external: Some(external),
            ..Self::local_only(max_local)
        }
    }

    pub fn mode(&self) -> &'static str {
        if self.external.is_some() {
            "external"
        } else {
            "local"
        }
    }

    /// Persist a result. Never fails: external errors downgrade to the local list.
    pub async fn save_result(&self, record: ResultRecord) {
        let Some(external) = &self.external else {
            self.push_local(record).await;
            return;
        };

        match external.save(&record).await {
            Ok(()) => debug!(job_id = %record.id, "Result saved to external store"),
            Err(e) => {
                warn!(job_id = %record.id, error = %e, "External result write failed, keeping result locally");
                self.push_local(record.clone()).await;

                let mut pending = self.pending_replay.lock().await;
                pending.push_back(record);
                while pending.len() > self.max_local {
                    if let Some(dropped) = pending.pop_front() {
                        warn!(job_id = %dropped.id, "Replay backlog full, dropping oldest pending result");
                    }
                }
            }
        }
    }

    async fn push_local(&self, record: ResultRecord) {
        let mut local = self.local.write().await;
        local.push_back(record);
        while local.len() > self.max_local {
            local.pop_front();
        }
    }

    pub async fn get_result(&self, id: &str) -> Option<ResultRecord> {
        if let Some(external) = &self.external {
            match external.get(id).await {
                Ok(Some(record)) => return Some(record),
                Ok(None) => {}
                Err(e) => warn!(job_id = %id, error = %e, "External result lookup failed, using local results"),
            }
        }

        let local = self.local.read().await;
        local.iter().rev().find(|r| r.id == id).cloned()
    }

    /// The `limit` most recent results, newest first. Reads one source only:
    /// the external store, or the local list when it is absent or failing.
    pub async fn list_results(&self, limit: usize) -> Vec<ResultRecord> {
        if let Some(external) = &self.external {
            match external.list(limit).await {
                Ok(records) => return records,
                Err(e) => warn!(error = %e, "External result listing failed, using local results"),
            }
        }

        let local = self.local.read().await;
        local.iter().rev().take(limit).cloned().collect()
    }

    /// Push results that fell back locally into the external store, oldest
    /// first, stopping at the first failure. Returns how many were replayed.
    pub async fn replay_pending(&self) -> usize {
        let Some(external) = &self.external else {
            return 0;
        };

        let mut replayed = 0;
        loop {
            // The lock is released during the write so fallback saves never wait on it
            let next = self.pending_replay.lock().await.front().cloned();
            let Some(record) = next else {
                break;
            };
            if let Err(e) = external.save(&record).await {
                warn!(job_id = %record.id, error = %e, "Result replay failed");
                break;
            }

            let mut pending = self.pending_replay.lock().await;
            if pending.front().is_some_and(|front| front.id == record.id) {
                pending.pop_front();
            }
            replayed += 1;
        }

        if replayed > 0 {
            info!(replayed, "Replayed locally held results to external store");
        }
        replayed
    }

    pub async fn pending_replay_len(&self) -> usize {
        self.pending_replay.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Job, JobPayload};
    use crate::types::AppError;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// In-memory external store that can be switched into a failing state
    #[derive(Default)]
    struct FlakyStore {
        failing: AtomicBool,
        records: std::sync::Mutex<Vec<ResultRecord>>,
    }

    impl FlakyStore {
        fn check(&self) -> AppResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(AppError::Internal("connection refused".to_string()))
            } else {
                Ok(())
            }
        }

        fn ids(&self) -> Vec<String> {
            self.records.lock().unwrap().iter().map(|r| r.id.clone()).collect()
        }
    }

    #[async_trait]
    impl ExternalResultStore for FlakyStore {
        async fn save(&self, record: &ResultRecord) -> AppResult<()> {
            self.check()?;
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn get(&self, id: &str) -> AppResult<Option<ResultRecord>> {
            self.check()?;
            Ok(self.records.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }

        async fn list(&self, limit: usize) -> AppResult<Vec<ResultRecord>> {
            self.check()?;
            Ok(self.records.lock().unwrap().iter().rev().take(limit).cloned().collect())
        }
    }

    /// External store that is down, and whose next write hangs until released
    #[derive(Default)]
    struct StallingStore {
        stall_next: AtomicBool,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl ExternalResultStore for StallingStore {
        async fn save(&self, _record: &ResultRecord) -> AppResult<()> {
            if self.stall_next.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn get(&self, _id: &str) -> AppResult<Option<ResultRecord>> {
            Err(AppError::Internal("connection refused".to_string()))
        }

        async fn list(&self, _limit: usize) -> AppResult<Vec<ResultRecord>> {
            Err(AppError::Internal("connection refused".to_string()))
        }
    }

    fn record(text: &str) -> ResultRecord {
        let job = Job::new("summary", JobPayload::text(text));
        ResultRecord::for_job(&job, json!({"success": true, "data": {"content": text}}))
    }

    #[tokio::test]
    async fn test_local_list_is_newest_first_and_truncated() {
        let store = ResultStore::local_only(100);
        let records: Vec<_> = ["one", "two", "three"].iter().map(|t| record(t)).collect();
        for r in &records {
            store.save_result(r.clone()).await;
        }

        let listed = store.list_results(2).await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, records[2].id);
        assert_eq!(listed[1].id, records[1].id);

        assert_eq!(store.get_result(&records[0].id).await, Some(records[0].clone()));
        assert!(store.get_result("missing").await.is_none());
        assert_eq!(store.mode(), "local");
    }

    #[tokio::test]
    async fn test_local_list_is_bounded() {
        let store = ResultStore::local_only(2);
        let records: Vec<_> = ["a", "b", "c"].iter().map(|t| record(t)).collect();
        for r in &records {
            store.save_result(r.clone()).await;
        }

        assert!(store.get_result(&records[0].id).await.is_none());
        assert_eq!(store.list_results(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_external_store_is_preferred() {
        let external = Arc::new(FlakyStore::default());
        let store = ResultStore::with_external(external.clone(), 100);
        let r = record("hello");

        store.save_result(r.clone()).await;

        assert_eq!(external.ids(), vec![r.id.clone()]);
        assert_eq!(store.get_result(&r.id).await, Some(r));
        assert_eq!(store.pending_replay_len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_write_falls_back_and_replays() {
        let external = Arc::new(FlakyStore::default());
        external.failing.store(true, Ordering::SeqCst);
        let store = ResultStore::with_external(external.clone(), 100);
        let first = record("first");
        let second = record("second");

        store.save_result(first.clone()).await;
        store.save_result(second.clone()).await;

        // External reads fail too, so the local copies answer
        assert_eq!(store.get_result(&first.id).await, Some(first.clone()));
        let listed = store.list_results(10).await;
        assert_eq!(listed.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec![second.id.clone(), first.id.clone()]);

        assert_eq!(store.replay_pending().await, 0);
        assert_eq!(store.pending_replay_len().await, 2);

        external.failing.store(false, Ordering::SeqCst);
        assert_eq!(store.replay_pending().await, 2);
        assert_eq!(store.pending_replay_len().await, 0);
        assert_eq!(external.ids(), vec![first.id.clone(), second.id.clone()]);
    }

    #[tokio::test]
    async fn test_fallback_write_does_not_wait_for_replay() {
        let external = Arc::new(StallingStore::default());
        let store = Arc::new(ResultStore::with_external(external.clone(), 100));
        let first = record("first");
        store.save_result(first.clone()).await;
        assert_eq!(store.pending_replay_len().await, 1);

        external.stall_next.store(true, Ordering::SeqCst);
        let replay = tokio::spawn({
            let store = store.clone();
            async move { store.replay_pending().await }
        });
        external.entered.notified().await;

        // Replay is parked inside the external write
        let second = record("second");
        tokio::time::timeout(Duration::from_secs(1), store.save_result(second.clone()))
            .await
            .expect("fallback save blocked behind replay");
        assert_eq!(store.get_result(&second.id).await, Some(second));

        external.release.notify_one();
        assert_eq!(replay.await.unwrap(), 0);
        assert_eq!(store.pending_replay_len().await, 2);
    }

    #[tokio::test]
    async fn test_external_miss_consults_local_list() {
        let external = Arc::new(FlakyStore::default());
        let store = ResultStore::with_external(external.clone(), 100);

        external.failing.store(true, Ordering::SeqCst);
        let r = record("stranded");
        store.save_result(r.clone()).await;
        external.failing.store(false, Ordering::SeqCst);

        // Reachable external store does not know the record yet
        assert_eq!(store.get_result(&r.id).await, Some(r));
        // Listing reads the external store only
        assert!(store.list_results(10).await.is_empty());
    }
}
