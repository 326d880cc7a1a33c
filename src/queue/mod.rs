//! In-memory analysis queue
//!
//! Jobs flow through a bounded channel into a single consumer task, so they
//! are processed strictly one at a time and in arrival order. The queue owns
//! the status board that HTTP handlers poll.
//!
//! ```text
//! enqueue ──► [ mpsc channel ] ──► consumer ──► AnalysisWorker::process
//!    │                                │
//!    └──── queued ──► StatusBoard ◄───┴── running ─► succeeded | failed
//! ```

pub mod jobs;
pub mod status;
pub mod workers;

pub use jobs::{Job, JobPayload};
pub use status::{JobState, JobStatus, StatusBoard};
pub use workers::AnalysisWorker;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::types::{AppError, AppResult};

#[derive(Clone)]
pub struct AnalysisQueue {
    sender: mpsc::Sender<Job>,
    statuses: StatusBoard,
    depth: Arc<AtomicUsize>,
    capacity: usize,
}

impl AnalysisQueue {
    /// Spawn the consumer task. It runs until `shutdown` fires.
    pub fn start(
        worker: AnalysisWorker,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let statuses = StatusBoard::default();
        let depth = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(run(
            receiver,
            worker,
            statuses.clone(),
            depth.clone(),
            shutdown,
        ));

        let queue = Self {
            sender,
            statuses,
            depth,
            capacity,
        };
        (queue, handle)
    }

    /// Accept a job. Its status reads `queued` before this returns; a
    /// rejected job leaves no status behind.
    pub async fn enqueue(&self, job: Job) -> AppResult<String> {
        let id = job.id.clone();
        let job_type = job.job_type.clone();

        self.statuses.set(&id, JobStatus::queued()).await;
        self.depth.fetch_add(1, Ordering::SeqCst);

        match self.sender.try_send(job) {
            Ok(()) => {
                info!(job_id = %id, job_type = %job_type, "Analysis job queued");
                Ok(id)
            }
            Err(e) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                self.statuses.remove(&id).await;
                match e {
                    TrySendError::Full(_) => {
                        warn!(job_id = %id, capacity = self.capacity, "Analysis queue full, rejecting job");
                        Err(AppError::QueueFull(self.capacity))
                    }
                    TrySendError::Closed(_) => {
                        Err(AppError::Internal("analysis queue is not running".to_string()))
                    }
                }
            }
        }
    }

    pub async fn get_status(&self, id: &str) -> Option<JobStatus> {
        self.statuses.get(id).await
    }

    pub async fn set_status(&self, id: &str, status: JobStatus) {
        self.statuses.set(id, status).await;
    }

    /// Jobs accepted but not yet picked up by the consumer
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> &StatusBoard {
        &self.statuses
    }
}

async fn run(
    mut receiver: mpsc::Receiver<Job>,
    worker: AnalysisWorker,
    statuses: StatusBoard,
    depth: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    info!("Analysis queue consumer started");

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        depth.fetch_sub(1, Ordering::SeqCst);

        statuses.set(&job.id, JobStatus::running(10)).await;
        info!(job_id = %job.id, job_type = %job.job_type, "Processing analysis job");

        let outcome = AssertUnwindSafe(worker.process(&job, &statuses, &shutdown))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                statuses.set(&job.id, JobStatus::succeeded()).await;
                info!(job_id = %job.id, "Analysis job succeeded");
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.id, error = %e, "Analysis job failed");
                statuses.set(&job.id, JobStatus::failed(e.to_string())).await;
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(job_id = %job.id, panic = %message, "Analysis job panicked");
                statuses
                    .set(&job.id, JobStatus::failed(format!("worker panicked: {}", message)))
                    .await;
            }
        }
    }

    info!("Analysis queue consumer stopped");
}
