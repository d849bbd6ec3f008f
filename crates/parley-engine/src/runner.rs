use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use parley_core::job::JobRecord;
use parley_core::provider::GenerationBackend;
use parley_core::request::GenerationRequest;
use parley_core::transcript::Transcript;
use parley_store::{Database, LedgerRepo};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::ledger::PromptTracker;
use crate::pipeline;
use crate::tracker::JobTracker;

pub const INITIAL_MESSAGE: &str = "Initializing processing";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long a completed transcript stays retrievable.
    pub result_ttl: Duration,
    /// Wall-clock limit for one job, summarize through final structuring.
    pub max_job_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(120),
            max_job_duration: Duration::from_secs(60 * 60),
        }
    }
}

/// Drives one job from `Created` to a terminal status.
#[derive(Clone)]
pub struct JobRunner {
    backend: Arc<dyn GenerationBackend>,
    jobs: JobTracker,
    ledger: LedgerRepo,
    config: EngineConfig,
}

impl JobRunner {
    pub fn new(backend: Arc<dyn GenerationBackend>, db: Database, config: EngineConfig) -> Self {
        Self {
            backend,
            jobs: JobTracker::new(db.clone()),
            ledger: LedgerRepo::new(db),
            config,
        }
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn ledger(&self) -> &LedgerRepo {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate a request and register its job. Nothing is created for a rejected request.
    pub fn submit(&self, request: &GenerationRequest) -> Result<JobRecord, PipelineError> {
        request.validate()?;
        self.jobs.create(&request.job_id)
    }

    /// Run the job's stage graph to a terminal status.
    ///
    /// Cancellation and the job deadline drop the graph with every in-flight call.
    /// On failure the job is marked `Failed` once with the error text; on success the
    /// transcript is stored before the job is marked `Completed`.
    #[instrument(skip_all, fields(job_id = %request.job_id, mode = ?request.mode))]
    pub async fn run(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Transcript, PipelineError> {
        let job_id = request.job_id.clone();
        let ctx = PipelineContext::new(
            self.backend.clone(),
            self.jobs.clone(),
            PromptTracker::new(self.ledger.clone(), job_id.clone(), request.user_id.clone()),
            job_id.clone(),
        );

        let limit = self.config.max_job_duration;
        let work = async {
            ctx.progress(INITIAL_MESSAGE)?;
            pipeline::run(&ctx, &request).await
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            result = tokio::time::timeout(limit, work) => {
                result.unwrap_or(Err(PipelineError::Timeout(limit)))
            }
        };

        let stored = outcome.and_then(|transcript| {
            let bytes = transcript
                .to_bytes()
                .map_err(|e| PipelineError::Internal(format!("transcript serialization: {e}")))?;
            self.jobs.complete(&job_id, &bytes, self.config.result_ttl)?;
            Ok(transcript)
        });

        match stored {
            Ok(transcript) => {
                info!(lines = transcript.dialogue.len(), "job completed");
                Ok(transcript)
            }
            Err(e) => {
                error!(error = %e, kind = e.error_kind(), "job failed");
                if let Err(mark) = self.jobs.fail(&job_id, &e.to_string()) {
                    warn!(error = %mark, "could not mark job failed");
                }
                Err(e)
            }
        }
    }
}
