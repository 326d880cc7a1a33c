// Periodic cleanup of process-local state

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::ResultCache;
use crate::queue::StatusBoard;
use crate::storage::ResultStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_cache_entries: usize,
    pub pruned_statuses: usize,
    pub replayed_results: usize,
}

#[derive(Clone)]
pub struct Maintenance {
    pub cache: ResultCache,
    pub statuses: StatusBoard,
    pub store: Arc<ResultStore>,
    pub status_retention: Duration,
}

impl Maintenance {
    pub async fn run_once(&self) -> MaintenanceReport {
        let report = MaintenanceReport {
            expired_cache_entries: self.cache.purge_expired().await,
            pruned_statuses: self.statuses.prune_terminal(self.status_retention).await,
            replayed_results: self.store.replay_pending().await,
        };
        if report != MaintenanceReport::default() {
            info!(
                expired_cache_entries = report.expired_cache_entries,
                pruned_statuses = report.pruned_statuses,
                replayed_results = report.replayed_results,
                "Maintenance sweep"
            );
        }
        report
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub fn spawn(self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
            debug!("Maintenance task stopped");
        })
    }
}
