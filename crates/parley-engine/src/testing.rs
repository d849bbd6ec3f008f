//! Fixtures shared by the engine's unit tests.

use std::sync::Arc;

use serde_json::{json, Value};

use parley_core::ids::{JobId, UserId};
use parley_core::job::JobRecord;
use parley_core::ledger::LedgerEntry;
use parley_core::request::{DocumentRole, GenerationMode, GenerationRequest, SourceDocument};
use parley_llm::{MockBackend, MockResponse};
use parley_store::{Database, LedgerRepo};

use crate::context::PipelineContext;
use crate::ledger::PromptTracker;
use crate::tracker::JobTracker;

pub const JOB: &str = "job-test";
pub const USER: &str = "user-test";

/// A mock backend plus an in-memory store with one created job.
pub struct Harness {
    pub mock: Arc<MockBackend>,
    jobs: JobTracker,
    ledger: LedgerRepo,
}

impl Harness {
    pub fn new(mock: MockBackend) -> Self {
        let db = Database::in_memory().unwrap();
        let jobs = JobTracker::new(db.clone());
        jobs.create(&JobId::from_raw(JOB)).unwrap();
        Self {
            mock: Arc::new(mock),
            jobs,
            ledger: LedgerRepo::new(db),
        }
    }

    pub fn context(&self) -> PipelineContext {
        PipelineContext::new(
            self.mock.clone(),
            self.jobs.clone(),
            PromptTracker::new(self.ledger.clone(), JobId::from_raw(JOB), UserId::from_raw(USER)),
            JobId::from_raw(JOB),
        )
    }

    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.ledger.list(&JobId::from_raw(JOB)).unwrap()
    }

    pub fn status(&self) -> JobRecord {
        self.jobs.status(&JobId::from_raw(JOB)).unwrap()
    }
}

pub fn doc(filename: &str, text: &str) -> SourceDocument {
    SourceDocument::new(filename, text, DocumentRole::Target)
}

pub fn dialogue_request(filenames: &[&str]) -> GenerationRequest {
    GenerationRequest {
        job_id: JobId::from_raw(JOB),
        user_id: UserId::from_raw(USER),
        mode: GenerationMode::Dialogue,
        duration_minutes: 10,
        guide: None,
        speaker_1_name: None,
        speaker_2_name: None,
        documents: filenames
            .iter()
            .map(|name| doc(name, &format!("text of {name}")))
            .collect(),
    }
}

pub fn monologue_request(text: &str) -> GenerationRequest {
    GenerationRequest {
        job_id: JobId::from_raw(JOB),
        user_id: UserId::from_raw(USER),
        mode: GenerationMode::Monologue,
        duration_minutes: 2,
        guide: None,
        speaker_1_name: None,
        speaker_2_name: None,
        documents: vec![doc("report.pdf", text)],
    }
}

/// Outline JSON with one segment per `(section, references)`. References are
/// comma separated; an empty string means none.
pub fn outline_json(sections: &[(&str, &str)]) -> Value {
    let segments: Vec<Value> = sections
        .iter()
        .map(|(section, refs)| {
            let references: Vec<&str> = refs.split(',').filter(|r| !r.is_empty()).collect();
            json!({
                "section": section,
                "topics": [{
                    "title": format!("{section} headline"),
                    "points": [{ "description": format!("{section} detail") }]
                }],
                "duration": 2,
                "references": references
            })
        })
        .collect();
    json!({ "title": "Test episode", "segments": segments })
}

pub fn transcript_json(two_speakers: bool) -> Value {
    let mut dialogue = vec![json!({ "text": "Welcome to the show.", "speaker": "speaker-1" })];
    if two_speakers {
        dialogue.push(json!({ "text": "Glad to be here.", "speaker": "speaker-2" }));
    }
    dialogue.push(json!({ "text": "Revenue grew 12%.", "speaker": "speaker-1" }));
    json!({ "scratchpad": "", "dialogue": dialogue })
}

/// Every call of the dialogue graph answered; each text response names its step.
pub fn dialogue_script(outline: Value) -> MockBackend {
    MockBackend::new()
        .on_prefix("summarize_", |call| {
            MockResponse::Text(format!("summary from {}", call.query_name))
        })
        .on("raw_outline", MockResponse::text("1. Intro\n2. Details"))
        .on("outline", MockResponse::Json(outline))
        .on_prefix("segment_transcript_", |call| {
            MockResponse::Text(format!("expanded {}", call.query_name))
        })
        .on_prefix("segment_dialogue_", |call| {
            MockResponse::Text(format!("Speaker 1: from {}", call.query_name))
        })
        .on_prefix("combine_dialogues_", |call| {
            MockResponse::Text(format!("merged through {}", call.query_name))
        })
        .on("create_final_conversation", MockResponse::Json(transcript_json(true)))
}

pub fn monologue_script() -> MockBackend {
    MockBackend::new()
        .on_prefix("summarize_", |_| MockResponse::text("Revenue rose 12 percent."))
        .on("raw_outline", MockResponse::text("1. Revenue growth"))
        .on("create_monologue", MockResponse::text("Revenue grew 12% this year."))
        .on("create_final_conversation", MockResponse::Json(transcript_json(false)))
}
