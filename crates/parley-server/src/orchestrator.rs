//! Job orchestrator: connects the job runner to the HTTP surface.
//!
//! `submit` validates and registers a job synchronously, then runs it on a background
//! task. Each running job holds a cancellation token that `cancel` fires. Run tasks
//! are tracked so shutdown can wait for them to record their final status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use parley_core::ids::JobId;
use parley_core::job::JobRecord;
use parley_core::request::GenerationRequest;
use parley_engine::{JobRunner, PipelineError};

#[async_trait]
pub trait JobOrchestrator: Send + Sync {
    /// Register a job and start it in the background. Returns the created record.
    async fn submit(&self, request: GenerationRequest) -> Result<JobRecord, PipelineError>;
    /// Signal a running job to stop. Returns false when it is not running.
    fn cancel(&self, job_id: &JobId) -> bool;
    fn is_running(&self, job_id: &JobId) -> bool;
    fn cancel_all(&self) -> usize;
    /// Cancel every running job and wait up to `grace` for each to reach a terminal
    /// status. Returns false when some run was still going at the deadline.
    async fn shutdown(&self, grace: Duration) -> bool;
}

/// Production orchestrator backed by [`JobRunner`].
pub struct EngineOrchestrator {
    runner: JobRunner,
    active: Arc<DashMap<JobId, CancellationToken>>,
    tasks: TaskTracker,
}

impl EngineOrchestrator {
    pub fn new(runner: JobRunner) -> Self {
        Self {
            runner,
            active: Arc::new(DashMap::new()),
            tasks: TaskTracker::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[async_trait]
impl JobOrchestrator for EngineOrchestrator {
    async fn submit(&self, request: GenerationRequest) -> Result<JobRecord, PipelineError> {
        let record = self.runner.submit(&request)?;

        let job_id = request.job_id.clone();
        let cancel = CancellationToken::new();
        self.active.insert(job_id.clone(), cancel.clone());

        let runner = self.runner.clone();
        let active = Arc::clone(&self.active);
        self.tasks.spawn(async move {
            if let Err(e) = runner.run(request, cancel).await {
                warn!(job_id = %job_id, error = %e, kind = e.error_kind(), "job ended with error");
            }
            active.remove(&job_id);
        });

        Ok(record)
    }

    fn cancel(&self, job_id: &JobId) -> bool {
        match self.active.remove(job_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn is_running(&self, job_id: &JobId) -> bool {
        self.active.contains_key(job_id)
    }

    fn cancel_all(&self) -> usize {
        let ids: Vec<JobId> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    async fn shutdown(&self, grace: Duration) -> bool {
        let cancelled = self.cancel_all();
        self.tasks.close();
        info!(
            cancelled,
            running = self.tasks.len(),
            grace_secs = grace.as_secs(),
            "draining jobs"
        );

        let drained = tokio::time::timeout(grace, self.tasks.wait()).await.is_ok();
        if !drained {
            warn!(
                remaining = self.tasks.len(),
                "shutdown grace period elapsed with jobs still running"
            );
        }
        drained
    }
}
