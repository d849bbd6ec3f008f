use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::Value;

use parley_core::errors::GatewayError;
use parley_core::provider::{EventStream, GenerationBackend, GenerationCall, ModelRole};
use parley_core::stream::{self as events, StreamEvent};

/// Pre-programmed responses for deterministic testing without network calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Plain response body.
    Text(String),
    /// Serialized as the response body.
    Json(Value),
    /// Yield exactly these events from `stream()`.
    Stream(Vec<StreamEvent>),
    /// Fail the call itself.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    /// A stream that ends with an error event after some text.
    pub fn stream_error(partial: &str, error: GatewayError) -> Self {
        Self::Stream(vec![
            StreamEvent::Start,
            StreamEvent::TextDelta { delta: partial.to_string() },
            StreamEvent::Error { error },
        ])
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

type Responder = Box<dyn Fn(&GenerationCall) -> MockResponse + Send + Sync>;

/// One recorded call.
#[derive(Clone, Debug)]
pub struct MockCall {
    pub query_name: String,
    pub role: ModelRole,
    pub prompt: String,
    pub schema: Option<Value>,
}

/// Mock backend with responses keyed by query name.
///
/// Fan-out stages issue calls in no fixed order, so scripts are looked up by name
/// rather than by call position. Lookup order: exact name, then the first matching
/// prefix responder, then the fallback. An exact queue keeps replaying its last entry.
pub struct MockBackend {
    exact: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    prefixes: Vec<(String, Responder)>,
    fallback: Option<Responder>,
    calls: Mutex<Vec<MockCall>>,
    call_count: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            exact: Mutex::new(HashMap::new()),
            prefixes: Vec::new(),
            fallback: None,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Queue a response for calls named exactly `query_name`.
    pub fn on(self, query_name: &str, response: MockResponse) -> Self {
        self.exact
            .lock()
            .entry(query_name.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Drop anything queued for `query_name` and answer it with `response` from now on.
    pub fn set(self, query_name: &str, response: MockResponse) -> Self {
        self.exact
            .lock()
            .insert(query_name.to_string(), VecDeque::from([response]));
        self
    }

    /// Answer every call whose name starts with `prefix`.
    pub fn on_prefix(
        mut self,
        prefix: &str,
        responder: impl Fn(&GenerationCall) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        self.prefixes.push((prefix.to_string(), Box::new(responder)));
        self
    }

    pub fn fallback(
        mut self,
        responder: impl Fn(&GenerationCall) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Box::new(responder));
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Recorded calls whose name starts with `prefix`.
    pub fn calls_named(&self, prefix: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.query_name.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn record(&self, call: &GenerationCall) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let prompt = call
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.calls.lock().push(MockCall {
            query_name: call.query_name.clone(),
            role: call.role,
            prompt,
            schema: call.output_schema.clone(),
        });
    }

    fn lookup(&self, call: &GenerationCall) -> Result<MockResponse, GatewayError> {
        if let Some(queue) = self.exact.lock().get_mut(&call.query_name) {
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(response) = next {
                return Ok(response);
            }
        }

        if let Some((_, responder)) = self
            .prefixes
            .iter()
            .find(|(prefix, _)| call.query_name.starts_with(prefix.as_str()))
        {
            return Ok(responder(call));
        }

        match &self.fallback {
            Some(responder) => Ok(responder(call)),
            None => Err(GatewayError::InvalidRequest(format!(
                "MockBackend: no response configured for query {}",
                call.query_name
            ))),
        }
    }

    /// Resolve delays iteratively, then hand back the terminal response.
    async fn resolve(&self, call: &GenerationCall) -> Result<MockResponse, GatewayError> {
        self.record(call);
        let mut current = self.lookup(call)?;
        loop {
            match current {
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
                MockResponse::Error(e) => return Err(e),
                other => return Ok(other),
            }
        }
    }
}

fn text_events(body: String) -> Vec<StreamEvent> {
    // Split into two deltas so consumers see real accumulation.
    let mid = body
        .char_indices()
        .nth(body.chars().count() / 2)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let (head, tail) = body.split_at(mid);
    let mut out = vec![StreamEvent::Start];
    for part in [head, tail] {
        if !part.is_empty() {
            out.push(StreamEvent::TextDelta { delta: part.to_string() });
        }
    }
    out.push(StreamEvent::Done { text: String::new() });
    out
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Reasoning => "mock-reasoning",
            ModelRole::Json => "mock-json",
            ModelRole::Iteration => "mock-iteration",
        }
    }

    async fn complete(&self, call: &GenerationCall) -> Result<String, GatewayError> {
        match self.resolve(call).await? {
            MockResponse::Text(text) => Ok(text),
            MockResponse::Json(value) => Ok(value.to_string()),
            MockResponse::Stream(script) => events::accumulate(Box::pin(stream::iter(script))).await,
            MockResponse::Error(e) => Err(e),
            MockResponse::Delay(..) => Err(GatewayError::InvalidRequest("unresolved delay".into())),
        }
    }

    async fn stream(&self, call: &GenerationCall) -> Result<EventStream, GatewayError> {
        let script = match self.resolve(call).await? {
            MockResponse::Text(text) => text_events(text),
            MockResponse::Json(value) => text_events(value.to_string()),
            MockResponse::Stream(script) => script,
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(..) => {
                return Err(GatewayError::InvalidRequest("unresolved delay".into()))
            }
        };
        Ok(Box::pin(stream::iter(script)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn call(name: &str) -> GenerationCall {
        GenerationCall::user_prompt(ModelRole::Reasoning, name, format!("prompt for {name}"))
    }

    #[tokio::test]
    async fn text_response_streams_as_deltas() {
        let mock = MockBackend::new().on("q", MockResponse::text("hello world"));
        let mut stream = mock.stream(&call("q")).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        assert_eq!(events.len(), 4); // Start, two deltas, Done
        assert!(matches!(events[0], StreamEvent::Start));
        assert!(matches!(events[3], StreamEvent::Done { .. }));
    }

    #[tokio::test]
    async fn exact_queue_replays_last() {
        let mock = MockBackend::new()
            .on("q", MockResponse::text("first"))
            .on("q", MockResponse::text("second"));
        assert_eq!(mock.complete(&call("q")).await.unwrap(), "first");
        assert_eq!(mock.complete(&call("q")).await.unwrap(), "second");
        assert_eq!(mock.complete(&call("q")).await.unwrap(), "second");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn set_replaces_queue() {
        let mock = MockBackend::new()
            .on("q", MockResponse::text("first"))
            .on("q", MockResponse::text("second"))
            .set("q", MockResponse::text("override"));
        assert_eq!(mock.complete(&call("q")).await.unwrap(), "override");
        assert_eq!(mock.complete(&call("q")).await.unwrap(), "override");
    }

    #[tokio::test]
    async fn prefix_and_fallback() {
        let mock = MockBackend::new()
            .on_prefix("summarize_", |c| MockResponse::Text(format!("summary of {}", c.query_name)))
            .fallback(|_| MockResponse::text("default"));
        assert_eq!(mock.complete(&call("summarize_2")).await.unwrap(), "summary of summarize_2");
        assert_eq!(mock.complete(&call("other")).await.unwrap(), "default");
        assert_eq!(mock.calls_named("summarize_").len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_query_is_error() {
        let mock = MockBackend::new();
        let result = mock.complete(&call("nothing")).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(msg)) if msg.contains("nothing")));
        // The attempt is still recorded.
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn error_and_stream_error() {
        let mock = MockBackend::new()
            .on("bad", MockResponse::Error(GatewayError::Overloaded))
            .on("cut", MockResponse::stream_error("par", GatewayError::StreamInterrupted("eof".into())));
        assert!(matches!(mock.complete(&call("bad")).await, Err(GatewayError::Overloaded)));
        let result = mock.complete(&call("cut")).await;
        assert!(matches!(result, Err(GatewayError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn json_response_serializes() {
        let mock = MockBackend::new().on("j", MockResponse::Json(serde_json::json!({"a": 1})));
        assert_eq!(mock.complete(&call("j")).await.unwrap(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn delayed_response() {
        tokio::time::pause();
        let mock = MockBackend::new().on(
            "slow",
            MockResponse::delayed(Duration::from_secs(30), MockResponse::text("done")),
        );
        let start = tokio::time::Instant::now();
        assert_eq!(mock.complete(&call("slow")).await.unwrap(), "done");
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn records_prompt_and_schema() {
        let mock = MockBackend::new().fallback(|_| MockResponse::text("{}"));
        let c = call("outline").with_schema(serde_json::json!({"type": "object"}));
        mock.complete(&c).await.unwrap();
        let recorded = &mock.calls()[0];
        assert_eq!(recorded.prompt, "prompt for outline");
        assert!(recorded.schema.is_some());
        assert_eq!(recorded.role, ModelRole::Reasoning);
    }
}
