use std::path::Path;

use serde::{Deserialize, Serialize};

use parley_core::provider::ModelRole;

pub const DEFAULT_API_BASE: &str = "https://integrate.api.nvidia.com/v1";
pub const DEFAULT_MODEL: &str = "meta/llama-3.1-405b-instruct";

/// One model endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Overrides the registry-wide API base for this role.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_base: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelConfigError {
    #[error("read model config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse model config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Role → model mapping.
///
/// ```json
/// {
///   "reasoning": { "name": "meta/llama-3.1-405b-instruct", "temperature": 0.2 },
///   "json":      { "name": "meta/llama-3.1-70b-instruct" },
///   "iteration": { "name": "meta/llama-3.1-405b-instruct", "max_tokens": 4096 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub reasoning: ModelConfig,
    #[serde(default = "default_model")]
    pub json: ModelConfig,
    #[serde(default = "default_model")]
    pub iteration: ModelConfig,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_model() -> ModelConfig {
    ModelConfig::named(DEFAULT_MODEL)
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            reasoning: default_model(),
            json: default_model(),
            iteration: default_model(),
        }
    }
}

impl ModelRegistry {
    /// Load from a JSON file. A missing file yields the built-in defaults.
    pub fn load(path: &Path) -> Result<Self, ModelConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "model config not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ModelConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| ModelConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn get(&self, role: ModelRole) -> &ModelConfig {
        match role {
            ModelRole::Reasoning => &self.reasoning,
            ModelRole::Json => &self.json,
            ModelRole::Iteration => &self.iteration,
        }
    }

    /// Base URL serving `role`, without a trailing slash.
    pub fn api_base_for(&self, role: ModelRole) -> &str {
        self.get(role)
            .api_base
            .as_deref()
            .unwrap_or(&self.api_base)
            .trim_end_matches('/')
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}
