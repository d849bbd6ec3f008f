//! Two-speaker graph:
//! summarize → raw outline → structured outline → expand segments (fan-out)
//! → segment dialogue (fan-out) → merge (fold) → final structuring.

use tracing::{instrument, warn};

use parley_core::outline::{DialogueFragment, Segment, SegmentArtifact, SegmentKey, StructuredOutline};
use parley_core::provider::ModelRole;
use parley_core::request::{GenerationRequest, SourceDocument};
use parley_core::transcript::Transcript;

use super::{digests, summarize_documents, SummaryStyle, STEP_FINAL, STEP_RAW_OUTLINE};
use crate::concurrency::{fan_out, fold};
use crate::context::{CallForm, PipelineContext};
use crate::contract;
use crate::error::PipelineError;
use crate::prompts::{
    CombineDialoguesParams, DialogueOutlineParams, DialogueTranscriptParams, Prompt,
    SegmentParams, SegmentToDialogueParams, StructuredOutlineParams,
};

pub const STEP_STRUCTURED_OUTLINE: &str = "outline";

#[instrument(skip_all, fields(job_id = %request.job_id, documents = request.documents.len()))]
pub async fn run(
    ctx: &PipelineContext,
    request: &GenerationRequest,
) -> Result<Transcript, PipelineError> {
    let mut documents = request.documents.clone();
    summarize_documents(ctx, &mut documents, SummaryStyle::Dialogue).await?;

    let raw_outline = raw_outline(ctx, request, &documents).await?;
    let outline = structured_outline(ctx, &raw_outline, &request.filenames()).await?;
    let artifacts = expand_segments(ctx, &outline, &documents).await?;
    let fragments = segment_dialogues(ctx, request, &outline, &artifacts).await?;
    let conversation = merge_dialogues(ctx, &outline, fragments).await?;
    final_transcript(ctx, request, &conversation).await
}

async fn raw_outline(
    ctx: &PipelineContext,
    request: &GenerationRequest,
    documents: &[SourceDocument],
) -> Result<String, PipelineError> {
    ctx.progress("Generating initial outline")?;
    let digests = digests(documents);
    let prompt = Prompt::DialogueOutline(DialogueOutlineParams {
        total_duration: request.duration_minutes,
        focus: request.guide(),
        documents: &digests,
    });
    ctx.generate_text(STEP_RAW_OUTLINE, ModelRole::Reasoning, &prompt, CallForm::Immediate)
        .await
}

/// Ask for the outline as JSON with references constrained to the submitted filenames.
async fn structured_outline(
    ctx: &PipelineContext,
    raw_outline: &str,
    filenames: &[String],
) -> Result<StructuredOutline, PipelineError> {
    ctx.progress("Converting raw outline to structured format")?;
    let schema = contract::outline_schema(filenames)?;
    let schema_text = serde_json::to_string_pretty(&schema)
        .map_err(|e| PipelineError::Internal(format!("outline schema: {e}")))?;

    let prompt = Prompt::StructuredOutline(StructuredOutlineParams {
        outline: raw_outline,
        schema: &schema_text,
        valid_filenames: filenames,
    });
    let value = ctx
        .generate_structured(
            STEP_STRUCTURED_OUTLINE,
            ModelRole::Json,
            &prompt,
            schema,
            CallForm::Immediate,
        )
        .await?;
    contract::parse_outline(STEP_STRUCTURED_OUTLINE, value, filenames)
}

fn angles(segment: &Segment) -> String {
    segment
        .topics
        .iter()
        .map(|t| t.title.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Talking points of a segment as a bullet list.
fn descriptions(segment: &Segment) -> String {
    let mut out = Vec::new();
    for topic in &segment.topics {
        out.push(format!("- {}", topic.title));
        for point in &topic.points {
            out.push(format!("  * {}", point.description));
        }
    }
    out.join("\n")
}

/// Joined text of the documents a segment references, or `None` when it has none.
fn referenced_text(segment: &Segment, documents: &[SourceDocument]) -> Option<String> {
    let texts: Vec<&str> = segment
        .references
        .iter()
        .filter_map(|name| documents.iter().find(|d| &d.filename == name))
        .map(|d| d.text.as_str())
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n\n"))
    }
}

/// One expansion call per segment, all in flight at once. Any failure fails the job.
async fn expand_segments(
    ctx: &PipelineContext,
    outline: &StructuredOutline,
    documents: &[SourceDocument],
) -> Result<Vec<SegmentArtifact>, PipelineError> {
    let total = outline.segments.len();
    for (idx, segment) in outline.segments.iter().enumerate() {
        ctx.progress(&format!(
            "Processing segment {}/{total}: {}",
            idx + 1,
            segment.section
        ))?;
    }

    fan_out(outline.segments.iter(), |idx, segment| {
        let key = SegmentKey(idx);
        async move {
            let angles = angles(segment);
            let text = referenced_text(segment, documents);
            let prompt = Prompt::Segment(SegmentParams {
                duration: segment.duration,
                topic: &segment.section,
                angles: &angles,
                text: text.as_deref(),
            });
            let text = ctx
                .generate_text(&key.to_string(), ModelRole::Iteration, &prompt, CallForm::Immediate)
                .await?;
            Ok(SegmentArtifact { key, text })
        }
    })
    .await
}

/// Turn each expanded segment into dialogue. Segments whose expansion came back
/// empty are skipped with a warning.
async fn segment_dialogues(
    ctx: &PipelineContext,
    request: &GenerationRequest,
    outline: &StructuredOutline,
    artifacts: &[SegmentArtifact],
) -> Result<Vec<DialogueFragment>, PipelineError> {
    ctx.progress("Generating dialogue")?;
    let total = outline.segments.len();

    let mut work: Vec<(&Segment, &SegmentArtifact)> = Vec::with_capacity(total);
    for (idx, segment) in outline.segments.iter().enumerate() {
        match artifacts.iter().find(|a| a.key.index() == idx) {
            Some(artifact) if !artifact.text.trim().is_empty() => {
                ctx.progress(&format!("Converting segment {}/{total} to dialogue", idx + 1))?;
                work.push((segment, artifact));
            }
            _ => warn!(segment = idx, section = %segment.section, "no expanded text, skipping segment"),
        }
    }

    let speaker_1 = request.speaker_1();
    let speaker_2 = request.speaker_2();

    fan_out(work, |_, (segment, artifact)| async move {
        let descriptions = descriptions(segment);
        let prompt = Prompt::SegmentToDialogue(SegmentToDialogueParams {
            text: &artifact.text,
            duration: segment.duration,
            descriptions: &descriptions,
            speaker_1,
            speaker_2,
        });
        let step = format!("segment_dialogue_{}", artifact.key.index());
        let dialogue = ctx
            .generate_text(&step, ModelRole::Reasoning, &prompt, CallForm::Immediate)
            .await?;
        Ok(DialogueFragment {
            key: artifact.key,
            section: segment.section.clone(),
            dialogue,
        })
    })
    .await
}

/// Fold the fragments into one conversation, in outline order, one call per join.
async fn merge_dialogues(
    ctx: &PipelineContext,
    outline: &StructuredOutline,
    fragments: Vec<DialogueFragment>,
) -> Result<String, PipelineError> {
    ctx.progress("Combining dialogue segments")?;

    let mut fragments = fragments.into_iter();
    let Some(first) = fragments.next() else {
        return Err(PipelineError::Internal("no dialogue segments to combine".into()));
    };

    let outline_text = serde_json::to_string(outline)
        .map_err(|e| PipelineError::Internal(format!("outline serialization: {e}")))?;
    let outline_json = outline_text.as_str();
    let rest: Vec<DialogueFragment> = fragments.collect();
    let total = rest.len() + 1;

    fold(rest, first.dialogue, |conversation, pos, fragment| async move {
        ctx.progress(&format!(
            "Combining segment {}/{total} with existing dialogue",
            pos + 2
        ))?;
        let prompt = Prompt::CombineDialogues(CombineDialoguesParams {
            outline: outline_json,
            dialogue_transcript: &conversation,
            next_section: &fragment.dialogue,
            current_section: &fragment.section,
        });
        let step = format!("combine_dialogues_{}", fragment.key.index());
        ctx.generate_text(&step, ModelRole::Iteration, &prompt, CallForm::Immediate)
            .await
    })
    .await
}

async fn final_transcript(
    ctx: &PipelineContext,
    request: &GenerationRequest,
    conversation: &str,
) -> Result<Transcript, PipelineError> {
    ctx.progress("Formatting final conversation")?;
    let schema = contract::transcript_schema(false)?;
    let schema_text = serde_json::to_string_pretty(&schema)
        .map_err(|e| PipelineError::Internal(format!("transcript schema: {e}")))?;

    let prompt = Prompt::DialogueTranscript(DialogueTranscriptParams {
        speaker_1: request.speaker_1(),
        speaker_2: request.speaker_2(),
        text: conversation,
        schema: &schema_text,
    });
    let value = ctx
        .generate_structured(STEP_FINAL, ModelRole::Json, &prompt, schema, CallForm::Streamed)
        .await?;
    contract::parse_transcript(STEP_FINAL, value, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dialogue_request, dialogue_script, outline_json, Harness};
    use parley_core::errors::GatewayError;
    use parley_core::transcript::Speaker;
    use parley_llm::MockResponse;

    #[tokio::test]
    async fn full_graph_produces_two_speaker_transcript() {
        let request = dialogue_request(&["q3.pdf", "market.pdf"]);
        let harness = Harness::new(dialogue_script(outline_json(&[
            ("Intro", "q3.pdf"),
            ("Market", "market.pdf"),
            ("Outlook", ""),
        ])));

        let transcript = run(&harness.context(), &request).await.unwrap();
        assert_eq!(transcript.speakers(), vec![Speaker::One, Speaker::Two]);

        let mock = &harness.mock;
        assert_eq!(mock.calls_named("summarize_").len(), 2);
        assert_eq!(mock.calls_named("segment_transcript_").len(), 3);
        assert_eq!(mock.calls_named("segment_dialogue_").len(), 3);
        assert_eq!(mock.calls_named("combine_dialogues_").len(), 2);
        assert_eq!(mock.calls_named(STEP_FINAL).len(), 1);

        // Structured calls carry their schemas.
        let outline_call = &mock.calls_named(STEP_STRUCTURED_OUTLINE)[0];
        assert_eq!(outline_call.role, ModelRole::Json);
        let schema = outline_call.schema.as_ref().unwrap();
        assert_eq!(
            schema["$defs"]["Segment"]["properties"]["references"]["items"]["enum"],
            serde_json::json!(["q3.pdf", "market.pdf"])
        );

        assert!(harness.ledger().iter().all(|e| e.is_complete()));
    }

    #[tokio::test]
    async fn segment_prompt_form_follows_references() {
        let request = dialogue_request(&["q3.pdf"]);
        let harness = Harness::new(dialogue_script(outline_json(&[
            ("Intro", "q3.pdf"),
            ("Wrap up", ""),
        ])));
        run(&harness.context(), &request).await.unwrap();

        let with = &harness.mock.calls_named("segment_transcript_0")[0];
        let without = &harness.mock.calls_named("segment_transcript_1")[0];
        assert!(with.prompt.contains("text of q3.pdf"));
        assert!(without.prompt.contains("No source document"));
        assert_eq!(with.role, ModelRole::Iteration);
    }

    #[tokio::test]
    async fn unknown_reference_fails_before_expansion() {
        let request = dialogue_request(&["q3.pdf"]);
        let harness = Harness::new(dialogue_script(outline_json(&[("Intro", "ghost.pdf")])));

        let err = run(&harness.context(), &request).await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { ref step, .. } if step == "outline"));
        assert!(harness.mock.calls_named("segment_").is_empty());
    }

    #[tokio::test]
    async fn escaped_outline_text_is_decoded_before_expansion() {
        let request = dialogue_request(&["q3.pdf"]);
        let harness = Harness::new(dialogue_script(outline_json(&[("Caf\\u00e9 sales", "q3.pdf")])));
        run(&harness.context(), &request).await.unwrap();

        let call = &harness.mock.calls_named("segment_transcript_0")[0];
        assert!(call.prompt.contains("Café sales"));
        assert!(!call.prompt.contains("\\u00e9"));
    }

    #[tokio::test]
    async fn merge_follows_outline_order() {
        let request = dialogue_request(&["q3.pdf"]);
        let harness = Harness::new(dialogue_script(outline_json(&[
            ("Alpha", ""),
            ("Beta", ""),
            ("Gamma", ""),
        ])));
        run(&harness.context(), &request).await.unwrap();

        let combines: Vec<_> = harness
            .ledger()
            .into_iter()
            .filter(|e| e.step_name.starts_with("combine_dialogues_"))
            .collect();
        let names: Vec<&str> = combines.iter().map(|e| e.step_name.as_str()).collect();
        assert_eq!(names, vec!["combine_dialogues_1", "combine_dialogues_2"]);
        assert!(combines[0].prompt.contains("section is \"Beta\""));
        assert!(combines[0].prompt.contains("Speaker 1: from segment_dialogue_0"));
        assert!(combines[1].prompt.contains("section is \"Gamma\""));
        // The second join sees the first join's output.
        assert!(combines[1].prompt.contains("merged through combine_dialogues_1"));
    }

    #[tokio::test]
    async fn reordered_outline_changes_merge_sequence() {
        let request = dialogue_request(&["q3.pdf"]);
        let harness = Harness::new(dialogue_script(outline_json(&[
            ("Gamma", ""),
            ("Alpha", ""),
            ("Beta", ""),
        ])));
        run(&harness.context(), &request).await.unwrap();

        let combines: Vec<_> = harness
            .ledger()
            .into_iter()
            .filter(|e| e.step_name.starts_with("combine_dialogues_"))
            .collect();
        assert!(combines[0].prompt.contains("section is \"Alpha\""));
        assert!(combines[0].prompt.contains("Speaker 1: from segment_dialogue_0"));
        assert!(combines[1].prompt.contains("section is \"Beta\""));
    }

    #[tokio::test]
    async fn empty_expansion_is_skipped() {
        let request = dialogue_request(&["q3.pdf"]);
        let script = dialogue_script(outline_json(&[("Intro", ""), ("Empty", ""), ("End", "")]))
            .on("segment_transcript_1", MockResponse::text("  "));
        let harness = Harness::new(script);

        run(&harness.context(), &request).await.unwrap();
        let dialogue_steps: Vec<String> = harness
            .mock
            .calls_named("segment_dialogue_")
            .into_iter()
            .map(|c| c.query_name)
            .collect();
        assert_eq!(dialogue_steps.len(), 2);
        assert!(!dialogue_steps.contains(&"segment_dialogue_1".to_string()));
        let combines = harness.mock.calls_named("combine_dialogues_");
        assert_eq!(combines.len(), 1);
        assert_eq!(combines[0].query_name, "combine_dialogues_2");
    }

    #[tokio::test]
    async fn all_segments_empty_is_internal_error() {
        let request = dialogue_request(&["q3.pdf"]);
        let script = dialogue_script(outline_json(&[("Only", "")]))
            .on("segment_transcript_0", MockResponse::text(""));
        let harness = Harness::new(script);

        let err = run(&harness.context(), &request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }

    #[tokio::test]
    async fn one_failed_expansion_fails_the_graph() {
        let request = dialogue_request(&["q3.pdf"]);
        let script = dialogue_script(outline_json(&[
            ("A", ""),
            ("B", ""),
            ("C", ""),
            ("D", ""),
        ]))
        .on("segment_transcript_2", MockResponse::Error(GatewayError::Overloaded));
        let harness = Harness::new(script);

        let err = run(&harness.context(), &request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Gateway(GatewayError::Overloaded)));

        let expansions: Vec<_> = harness
            .ledger()
            .into_iter()
            .filter(|e| e.step_name.starts_with("segment_transcript_"))
            .collect();
        assert_eq!(expansions.len(), 4);
        assert_eq!(expansions.iter().filter(|e| e.is_complete()).count(), 3);
        assert!(harness.mock.calls_named("segment_dialogue_").is_empty());
    }

    #[tokio::test]
    async fn final_text_is_unescaped() {
        let request = dialogue_request(&["q3.pdf"]);
        let script = dialogue_script(outline_json(&[("Intro", "")])).set(
            STEP_FINAL,
            MockResponse::Json(serde_json::json!({
                "scratchpad": "",
                "dialogue": [
                    { "text": "Caf\\u00e9 numbers", "speaker": "speaker-1" },
                    { "text": "Go on", "speaker": "speaker-2" }
                ]
            })),
        );
        let harness = Harness::new(script);

        let transcript = run(&harness.context(), &request).await.unwrap();
        assert_eq!(transcript.dialogue[0].text, "Café numbers");
    }

    #[tokio::test]
    async fn custom_speaker_names_reach_prompts() {
        let mut request = dialogue_request(&["q3.pdf"]);
        request.speaker_1_name = Some("Ada".into());
        request.speaker_2_name = Some("Grace".into());
        let harness = Harness::new(dialogue_script(outline_json(&[("Intro", "")])));

        run(&harness.context(), &request).await.unwrap();
        let call = &harness.mock.calls_named("segment_dialogue_0")[0];
        assert!(call.prompt.contains("Ada") && call.prompt.contains("Grace"));
        assert!(harness.mock.calls_named(STEP_FINAL)[0].prompt.contains("by Ada"));
    }

    #[test]
    fn descriptions_list_topics_and_points() {
        let outline: StructuredOutline =
            serde_json::from_value(outline_json(&[("Intro", "")])).unwrap();
        assert_eq!(
            descriptions(&outline.segments[0]),
            "- Intro headline\n  * Intro detail"
        );
    }
}
