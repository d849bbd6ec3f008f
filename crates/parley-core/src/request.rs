use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ids::{JobId, UserId};

pub const DEFAULT_SPEAKER_1: &str = "Speaker 1";
pub const DEFAULT_SPEAKER_2: &str = "Speaker 2";

/// How a document participates in the outline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    /// The subject of the transcript.
    Target,
    /// Background material.
    Context,
}

impl DocumentRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Target => "Target Document",
            Self::Context => "Context Document",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Success,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub filename: String,
    /// Extracted text of the document.
    pub text: String,
    /// Filled in by the summarization stage.
    #[serde(default)]
    pub summary: String,
    pub role: DocumentRole,
    pub status: ConversionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, text: impl Into<String>, role: DocumentRole) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
            summary: String::new(),
            role,
            status: ConversionStatus::Success,
            error: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Single narrator.
    Monologue,
    /// Two speakers.
    Dialogue,
}

/// A submitted job. Treated as immutable by callers; the pipeline works on its own copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub job_id: JobId,
    pub user_id: UserId,
    pub mode: GenerationMode,
    /// Target length in minutes.
    pub duration_minutes: u32,
    #[serde(default)]
    pub guide: Option<String>,
    #[serde(default)]
    pub speaker_1_name: Option<String>,
    #[serde(default)]
    pub speaker_2_name: Option<String>,
    pub documents: Vec<SourceDocument>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("job id must not be empty")]
    MissingJobId,
    #[error("user id must not be empty")]
    MissingUserId,
    #[error("at least one document is required")]
    NoDocuments,
    #[error("document at position {0} has an empty filename")]
    EmptyFilename(usize),
    #[error("duplicate document filename: {0}")]
    DuplicateFilename(String),
    #[error("document {filename} failed conversion: {reason}")]
    ConversionFailed { filename: String, reason: String },
    #[error("document {0} has no extracted text")]
    EmptyDocument(String),
    #[error("duration must be greater than zero")]
    ZeroDuration,
}

impl GenerationRequest {
    pub fn speaker_1(&self) -> &str {
        non_blank(&self.speaker_1_name).unwrap_or(DEFAULT_SPEAKER_1)
    }

    pub fn speaker_2(&self) -> &str {
        non_blank(&self.speaker_2_name).unwrap_or(DEFAULT_SPEAKER_2)
    }

    pub fn guide(&self) -> Option<&str> {
        non_blank(&self.guide)
    }

    /// Filenames in submission order. These are the only legal outline references.
    pub fn filenames(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.filename.clone()).collect()
    }

    pub fn document(&self, filename: &str) -> Option<&SourceDocument> {
        self.documents.iter().find(|d| d.filename == filename)
    }

    /// Shape checks run before a job is created.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.job_id.is_blank() {
            return Err(ValidationError::MissingJobId);
        }
        if self.user_id.is_blank() {
            return Err(ValidationError::MissingUserId);
        }
        if self.documents.is_empty() {
            return Err(ValidationError::NoDocuments);
        }
        if self.duration_minutes == 0 {
            return Err(ValidationError::ZeroDuration);
        }

        let mut seen = HashSet::new();
        for (idx, doc) in self.documents.iter().enumerate() {
            if doc.filename.trim().is_empty() {
                return Err(ValidationError::EmptyFilename(idx));
            }
            if !seen.insert(doc.filename.as_str()) {
                return Err(ValidationError::DuplicateFilename(doc.filename.clone()));
            }
            if doc.status == ConversionStatus::Failed {
                return Err(ValidationError::ConversionFailed {
                    filename: doc.filename.clone(),
                    reason: doc.error.clone().unwrap_or_else(|| "unknown error".into()),
                });
            }
            if doc.text.trim().is_empty() {
                return Err(ValidationError::EmptyDocument(doc.filename.clone()));
            }
        }
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(documents: Vec<SourceDocument>) -> GenerationRequest {
        GenerationRequest {
            job_id: JobId::from_raw("job-1"),
            user_id: UserId::from_raw("user-1"),
            mode: GenerationMode::Dialogue,
            duration_minutes: 5,
            guide: None,
            speaker_1_name: None,
            speaker_2_name: None,
            documents,
        }
    }

    fn doc(name: &str) -> SourceDocument {
        SourceDocument::new(name, "some text", DocumentRole::Target)
    }

    #[test]
    fn valid_request_passes() {
        assert_eq!(request(vec![doc("a.pdf"), doc("b.pdf")]).validate(), Ok(()));
    }

    #[test]
    fn rejects_missing_ids() {
        let mut req = request(vec![doc("a.pdf")]);
        req.job_id = JobId::from_raw("");
        assert_eq!(req.validate(), Err(ValidationError::MissingJobId));

        let mut req = request(vec![doc("a.pdf")]);
        req.user_id = UserId::from_raw(" ");
        assert_eq!(req.validate(), Err(ValidationError::MissingUserId));
    }

    #[test]
    fn rejects_empty_document_list() {
        assert_eq!(request(vec![]).validate(), Err(ValidationError::NoDocuments));
    }

    #[test]
    fn rejects_duplicate_filenames() {
        let err = request(vec![doc("a.pdf"), doc("a.pdf")]).validate().unwrap_err();
        assert_eq!(err, ValidationError::DuplicateFilename("a.pdf".into()));
    }

    #[test]
    fn rejects_failed_conversion() {
        let mut bad = doc("scan.pdf");
        bad.status = ConversionStatus::Failed;
        bad.error = Some("encrypted".into());
        let err = request(vec![bad]).validate().unwrap_err();
        assert!(err.to_string().contains("encrypted"), "got: {err}");
    }

    #[test]
    fn rejects_blank_text_and_filename() {
        let mut blank = doc("empty.pdf");
        blank.text = "   ".into();
        assert_eq!(
            request(vec![blank]).validate(),
            Err(ValidationError::EmptyDocument("empty.pdf".into()))
        );
        assert_eq!(
            request(vec![doc("ok.pdf"), doc("")]).validate(),
            Err(ValidationError::EmptyFilename(1))
        );
    }

    #[test]
    fn rejects_zero_duration() {
        let mut req = request(vec![doc("a.pdf")]);
        req.duration_minutes = 0;
        assert_eq!(req.validate(), Err(ValidationError::ZeroDuration));
    }

    #[test]
    fn speaker_defaults_and_overrides() {
        let mut req = request(vec![doc("a.pdf")]);
        assert_eq!(req.speaker_1(), DEFAULT_SPEAKER_1);
        assert_eq!(req.speaker_2(), DEFAULT_SPEAKER_2);
        req.speaker_1_name = Some("Blackwell".into());
        req.speaker_2_name = Some("  ".into());
        assert_eq!(req.speaker_1(), "Blackwell");
        assert_eq!(req.speaker_2(), DEFAULT_SPEAKER_2);
    }

    #[test]
    fn filenames_keep_submission_order() {
        let req = request(vec![doc("z.pdf"), doc("a.pdf")]);
        assert_eq!(req.filenames(), vec!["z.pdf".to_string(), "a.pdf".to_string()]);
        assert!(req.document("a.pdf").is_some());
        assert!(req.document("missing.pdf").is_none());
    }

    #[test]
    fn role_labels() {
        assert_eq!(DocumentRole::Target.label(), "Target Document");
        assert_eq!(DocumentRole::Context.label(), "Context Document");
    }

    #[test]
    fn deserializes_with_defaults() {
        let req: GenerationRequest = serde_json::from_value(serde_json::json!({
            "job_id": "j",
            "user_id": "u",
            "mode": "monologue",
            "duration_minutes": 3,
            "documents": [{
                "filename": "q3.pdf",
                "text": "Revenue grew 12%.",
                "role": "target",
                "status": "success"
            }]
        }))
        .unwrap();
        assert_eq!(req.mode, GenerationMode::Monologue);
        assert!(req.documents[0].summary.is_empty());
        assert!(req.guide().is_none());
    }
}
