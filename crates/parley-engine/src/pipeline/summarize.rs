use parley_core::provider::ModelRole;
use parley_core::request::SourceDocument;

use crate::concurrency::fan_out;
use crate::context::{CallForm, PipelineContext};
use crate::error::PipelineError;
use crate::prompts::{DocumentDigest, Prompt, SummaryParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SummaryStyle {
    Dialogue,
    Monologue,
}

/// Summarize every document concurrently, one call per document, and attach each
/// summary to its document. Any failed or blank summary fails the stage.
pub(crate) async fn summarize_documents(
    ctx: &PipelineContext,
    documents: &mut [SourceDocument],
    style: SummaryStyle,
) -> Result<(), PipelineError> {
    ctx.progress(&format!("Summarizing {} documents", documents.len()))?;

    let summaries = fan_out(documents.iter(), |idx, doc| {
        let step = format!("summarize_{idx}");
        async move {
            let params = SummaryParams { text: &doc.text };
            let prompt = match style {
                SummaryStyle::Dialogue => Prompt::DialogueSummary(params),
                SummaryStyle::Monologue => Prompt::MonologueSummary(params),
            };
            let summary = ctx
                .generate_text(&step, ModelRole::Reasoning, &prompt, CallForm::Immediate)
                .await?;
            if summary.trim().is_empty() {
                return Err(PipelineError::Internal(format!(
                    "empty summary for document {}",
                    doc.filename
                )));
            }
            Ok(summary)
        }
    })
    .await?;

    for (doc, summary) in documents.iter_mut().zip(summaries) {
        doc.summary = summary;
    }
    Ok(())
}

pub(crate) fn digests(documents: &[SourceDocument]) -> Vec<DocumentDigest<'_>> {
    documents
        .iter()
        .map(|d| DocumentDigest {
            filename: &d.filename,
            label: d.role.label(),
            summary: &d.summary,
        })
        .collect()
}
