use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::stream::StreamEvent;

/// Which configured model a call is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Long-form reasoning and writing.
    Reasoning,
    /// Strict-schema structured output.
    Json,
    /// Expansion and iterative merging.
    Iteration,
}

impl ModelRole {
    pub const ALL: [ModelRole; 3] = [Self::Reasoning, Self::Json, Self::Iteration];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Json => "json",
            Self::Iteration => "iteration",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelRole {
    type Err = GatewayError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reasoning" => Ok(Self::Reasoning),
            "json" => Ok(Self::Json),
            "iteration" => Ok(Self::Iteration),
            other => Err(GatewayError::UnknownModel(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

/// One request to the generation backend.
#[derive(Clone, Debug)]
pub struct GenerationCall {
    pub role: ModelRole,
    pub messages: Vec<ChatMessage>,
    /// Name of the query for backend-side logging. Pipeline calls use the ledger step name.
    pub query_name: String,
    /// When present the backend is asked to constrain its output to this JSON schema.
    pub output_schema: Option<serde_json::Value>,
}

impl GenerationCall {
    pub fn user_prompt(
        role: ModelRole,
        query_name: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            role,
            messages: vec![ChatMessage::user(prompt)],
            query_name: query_name.into(),
            output_schema: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A generation backend. Implementations route each call to the model configured
/// for its role and may honour `output_schema` with constrained decoding.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Model identifier serving `role`, as recorded in the ledger.
    fn model_for(&self, role: ModelRole) -> &str;

    /// Immediate form: the full response body in one piece.
    async fn complete(&self, call: &GenerationCall) -> Result<String, GatewayError>;

    /// Streaming form: incremental text events terminated by `Done` or `Error`.
    async fn stream(&self, call: &GenerationCall) -> Result<EventStream, GatewayError>;
}
