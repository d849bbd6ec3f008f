use std::time::Duration;

use tracing::{info, instrument};

use parley_core::ids::JobId;
use parley_core::job::{JobRecord, JobStatus};
use parley_store::{Database, JobRepo, ResultRepo, StoreError};

use crate::error::PipelineError;

pub const CREATED_MESSAGE: &str = "Job created";
pub const COMPLETED_MESSAGE: &str = "Transcription completed successfully";

/// Per-job status and result bookkeeping.
///
/// Status moves `Created -> Processing* -> Completed | Failed`. A result is written
/// before the job is marked completed, so a reader that sees `Completed` can fetch it
/// until the retention window runs out.
#[derive(Clone)]
pub struct JobTracker {
    jobs: JobRepo,
    results: ResultRepo,
}

impl JobTracker {
    pub fn new(db: Database) -> Self {
        Self {
            jobs: JobRepo::new(db.clone()),
            results: ResultRepo::new(db),
        }
    }

    pub fn create(&self, job_id: &JobId) -> Result<JobRecord, PipelineError> {
        Ok(self.jobs.create(job_id, CREATED_MESSAGE)?)
    }

    /// Record a progress message. The job stays in (or enters) `Processing`.
    pub fn processing(&self, job_id: &JobId, message: &str) -> Result<JobRecord, PipelineError> {
        info!(job_id = %job_id, "{message}");
        Ok(self.jobs.update_status(job_id, JobStatus::Processing, message)?)
    }

    /// Store the result for `ttl`, then mark the job completed.
    #[instrument(skip(self, bytes), fields(job_id = %job_id))]
    pub fn complete(
        &self,
        job_id: &JobId,
        bytes: &[u8],
        ttl: Duration,
    ) -> Result<JobRecord, PipelineError> {
        self.results.set_with_expiration(job_id, bytes, ttl)?;
        Ok(self.jobs.update_status(job_id, JobStatus::Completed, COMPLETED_MESSAGE)?)
    }

    pub fn fail(&self, job_id: &JobId, message: &str) -> Result<JobRecord, PipelineError> {
        Ok(self.jobs.update_status(job_id, JobStatus::Failed, message)?)
    }

    pub fn status(&self, job_id: &JobId) -> Result<JobRecord, StoreError> {
        self.jobs.get(job_id)
    }

    pub fn result(&self, job_id: &JobId) -> Result<Vec<u8>, StoreError> {
        self.results.get(job_id)
    }

    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        self.results.purge_expired()
    }
}
