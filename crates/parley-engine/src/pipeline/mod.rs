//! Stage graphs for the two generation modes.
//!
//! Both graphs open with the same summarize fan-out and close with a structuring call
//! whose output must satisfy the transcript contract. Everything in between differs.

pub mod dialogue;
pub mod monologue;
mod summarize;

use parley_core::request::{GenerationMode, GenerationRequest};
use parley_core::transcript::Transcript;

use crate::context::PipelineContext;
use crate::error::PipelineError;

pub(crate) use summarize::{digests, summarize_documents, SummaryStyle};

pub const STEP_RAW_OUTLINE: &str = "raw_outline";
pub const STEP_FINAL: &str = "create_final_conversation";

/// Run the graph for the request's mode and return its transcript.
pub async fn run(
    ctx: &PipelineContext,
    request: &GenerationRequest,
) -> Result<Transcript, PipelineError> {
    match request.mode {
        GenerationMode::Dialogue => dialogue::run(ctx, request).await,
        GenerationMode::Monologue => monologue::run(ctx, request).await,
    }
}
