use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use parley_core::errors::GatewayError;
use parley_core::generate::{self, Generated};
use parley_core::provider::{GenerationBackend, GenerationCall};

/// Blocking facade over a [`GenerationBackend`] for callers outside an async runtime.
///
/// Owns a current-thread runtime; must not be used from within another runtime.
pub struct BlockingBackend {
    backend: Arc<dyn GenerationBackend>,
    runtime: Runtime,
}

impl BlockingBackend {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { backend, runtime })
    }

    pub fn query(&self, call: &GenerationCall) -> Result<Generated, GatewayError> {
        self.runtime
            .block_on(generate::query(self.backend.as_ref(), call))
    }

    pub fn query_streamed(&self, call: &GenerationCall) -> Result<Generated, GatewayError> {
        self.runtime
            .block_on(generate::query_streamed(self.backend.as_ref(), call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::provider::ModelRole;
    use serde_json::json;

    use crate::mock::{MockBackend, MockResponse};

    #[test]
    fn blocking_text_query() {
        let mock = MockBackend::new().on("ping_check", MockResponse::text("pong"));
        let blocking = BlockingBackend::new(Arc::new(mock)).unwrap();
        let call = GenerationCall::user_prompt(ModelRole::Reasoning, "ping_check", "ping");
        assert_eq!(blocking.query(&call).unwrap(), Generated::Text("pong".into()));
        assert_eq!(
            blocking.query_streamed(&call).unwrap(),
            Generated::Text("pong".into())
        );
    }

    #[test]
    fn blocking_structured_query() {
        let mock = MockBackend::new().on("person", MockResponse::Json(json!({"name": "Ada"})));
        let blocking = BlockingBackend::new(Arc::new(mock)).unwrap();
        let call = GenerationCall::user_prompt(ModelRole::Json, "person", "describe")
            .with_schema(json!({"type": "object"}));
        let value = blocking.query(&call).unwrap().into_structured().unwrap();
        assert_eq!(value["name"], "Ada");
    }

    #[test]
    fn blocking_error_propagates() {
        let mock = MockBackend::new().on("ping_check", MockResponse::Error(GatewayError::Overloaded));
        let blocking = BlockingBackend::new(Arc::new(mock)).unwrap();
        let call = GenerationCall::user_prompt(ModelRole::Reasoning, "ping_check", "ping");
        assert!(matches!(blocking.query(&call), Err(GatewayError::Overloaded)));
    }
}
