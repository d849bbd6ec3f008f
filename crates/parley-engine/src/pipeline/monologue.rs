//! Single-speaker graph: summarize → outline synthesis → monologue → final structuring.

use tracing::instrument;

use parley_core::provider::ModelRole;
use parley_core::request::{GenerationRequest, SourceDocument};
use parley_core::transcript::Transcript;

use super::{digests, summarize_documents, SummaryStyle, STEP_FINAL, STEP_RAW_OUTLINE};
use crate::context::{CallForm, PipelineContext};
use crate::contract;
use crate::error::PipelineError;
use crate::prompts::{
    MonologueDraftParams, MonologueOutlineParams, MonologueTranscriptParams, Prompt,
    DEFAULT_MONOLOGUE_FOCUS,
};

pub const STEP_MONOLOGUE: &str = "create_monologue";

#[instrument(skip_all, fields(job_id = %request.job_id, documents = request.documents.len()))]
pub async fn run(
    ctx: &PipelineContext,
    request: &GenerationRequest,
) -> Result<Transcript, PipelineError> {
    let mut documents = request.documents.clone();
    summarize_documents(ctx, &mut documents, SummaryStyle::Monologue).await?;

    let outline = synthesize_outline(ctx, request, &documents).await?;
    let monologue = draft_monologue(ctx, request, &outline).await?;
    final_transcript(ctx, request, &monologue).await
}

async fn synthesize_outline(
    ctx: &PipelineContext,
    request: &GenerationRequest,
    documents: &[SourceDocument],
) -> Result<String, PipelineError> {
    ctx.progress("Generating initial outline")?;
    let digests = digests(documents);
    let prompt = Prompt::MonologueOutline(MonologueOutlineParams {
        focus: request.guide(),
        documents: &digests,
    });
    ctx.generate_text(STEP_RAW_OUTLINE, ModelRole::Reasoning, &prompt, CallForm::Immediate)
        .await
}

async fn draft_monologue(
    ctx: &PipelineContext,
    request: &GenerationRequest,
    outline: &str,
) -> Result<String, PipelineError> {
    ctx.progress("Creating monologue transcript")?;
    let filenames = request.filenames();
    let prompt = Prompt::MonologueDraft(MonologueDraftParams {
        raw_outline: outline,
        documents: &filenames,
        focus: request.guide().unwrap_or(DEFAULT_MONOLOGUE_FOCUS),
        speaker_1: request.speaker_1(),
    });
    ctx.generate_text(STEP_MONOLOGUE, ModelRole::Reasoning, &prompt, CallForm::Immediate)
        .await
}

async fn final_transcript(
    ctx: &PipelineContext,
    request: &GenerationRequest,
    monologue: &str,
) -> Result<Transcript, PipelineError> {
    ctx.progress("Formatting final conversation")?;
    let schema = contract::transcript_schema(true)?;
    let schema_text = serde_json::to_string_pretty(&schema)
        .map_err(|e| PipelineError::Internal(format!("transcript schema: {e}")))?;

    let prompt = Prompt::MonologueTranscript(MonologueTranscriptParams {
        speaker_1: request.speaker_1(),
        text: monologue,
        schema: &schema_text,
    });
    let value = ctx
        .generate_structured(STEP_FINAL, ModelRole::Json, &prompt, schema, CallForm::Immediate)
        .await?;
    contract::parse_transcript(STEP_FINAL, value, true)
}
