use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use parley_core::errors::GatewayError;
use parley_core::generate::{self, Generated};
use parley_core::ids::JobId;
use parley_core::provider::{GenerationBackend, GenerationCall, ModelRole};

use crate::error::PipelineError;
use crate::ledger::PromptTracker;
use crate::prompts::{Prompt, TemplateId};
use crate::tracker::JobTracker;

/// How a call is sent to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallForm {
    Immediate,
    /// Consume the event stream and accumulate it before parsing.
    Streamed,
}

/// Everything a stage needs: the backend, the job's status and ledger, and its ids.
pub struct PipelineContext {
    backend: Arc<dyn GenerationBackend>,
    jobs: JobTracker,
    prompts: PromptTracker,
    job_id: JobId,
}

impl PipelineContext {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        jobs: JobTracker,
        prompts: PromptTracker,
        job_id: JobId,
    ) -> Self {
        Self {
            backend,
            jobs,
            prompts,
            job_id,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Publish a progress message on the job's status record.
    pub fn progress(&self, message: &str) -> Result<(), PipelineError> {
        self.jobs.processing(&self.job_id, message)?;
        Ok(())
    }

    /// Free-text generation, recorded in the ledger under `step`.
    pub async fn generate_text(
        &self,
        step: &str,
        role: ModelRole,
        prompt: &Prompt<'_>,
        form: CallForm,
    ) -> Result<String, PipelineError> {
        let call = GenerationCall::user_prompt(role, step, prompt.render());
        let generated = self.generate(step, prompt.id(), &call, form).await?;
        Ok(generated.into_text()?)
    }

    /// Schema-constrained generation. A body that is not JSON is a schema violation
    /// of `step`; checking the value against the schema is left to the caller.
    pub async fn generate_structured(
        &self,
        step: &str,
        role: ModelRole,
        prompt: &Prompt<'_>,
        schema: Value,
        form: CallForm,
    ) -> Result<Value, PipelineError> {
        let call = GenerationCall::user_prompt(role, step, prompt.render()).with_schema(schema);
        let generated = self
            .generate(step, prompt.id(), &call, form)
            .await
            .map_err(|e| match e {
                PipelineError::Gateway(GatewayError::MalformedResponse(detail)) => {
                    PipelineError::schema(step, detail)
                }
                other => other,
            })?;
        Ok(generated.into_structured()?)
    }

    /// Track the step, make the call, attach the response. A failed call leaves the
    /// step pending in the ledger.
    #[instrument(
        skip(self, template, call),
        fields(job_id = %self.job_id, template = %template, role = %call.role)
    )]
    async fn generate(
        &self,
        step: &str,
        template: TemplateId,
        call: &GenerationCall,
        form: CallForm,
    ) -> Result<Generated, PipelineError> {
        let model = self.backend.model_for(call.role);
        let prompt = call
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.prompts.track(step, &prompt, model)?;

        let generated = match form {
            CallForm::Immediate => generate::query(self.backend.as_ref(), call).await?,
            CallForm::Streamed => generate::query_streamed(self.backend.as_ref(), call).await?,
        };

        let response = match &generated {
            Generated::Text(text) => text.clone(),
            Generated::Structured(value) => value.to_string(),
        };
        self.prompts.update_result(step, &response)?;
        debug!(model, response_len = response.len(), "step complete");
        Ok(generated)
    }
}
