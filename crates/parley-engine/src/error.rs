use std::time::Duration;

use parley_core::errors::GatewayError;
use parley_core::request::ValidationError;
use parley_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("generation backend error: {0}")]
    Gateway(#[from] GatewayError),

    /// Structured output that does not match its schema or typed form.
    #[error("schema violation in {step}: {detail}")]
    SchemaViolation { step: String, detail: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("job cancelled")]
    Cancelled,

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    pub fn schema(step: impl Into<String>, detail: impl ToString) -> Self {
        Self::SchemaViolation {
            step: step.into(),
            detail: detail.to_string(),
        }
    }

    /// Short classification string for logs and error bodies.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Gateway(GatewayError::Cancelled) | Self::Cancelled => "cancelled",
            Self::Gateway(_) => "generation_backend",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::Store(_) => "store",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}
