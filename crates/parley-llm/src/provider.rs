use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Future, Stream};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use parley_core::errors::GatewayError;
use parley_core::provider::{EventStream, GenerationBackend, GenerationCall, ModelRole};
use parley_core::stream::StreamEvent;

use crate::models::ModelRegistry;
use crate::sse::{self, ChunkParser};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Backend for any server speaking the OpenAI chat-completions protocol.
pub struct OpenAiBackend {
    client: Client,
    api_key: Option<SecretString>,
    registry: ModelRegistry,
}

impl OpenAiBackend {
    pub fn new(registry: ModelRegistry, api_key: Option<SecretString>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            registry,
        })
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn build_request(&self, call: &GenerationCall, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.registry.api_base_for(call.role));
        let body = build_request_body(&self.registry, call, stream);

        let mut req = self.client.post(url);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }
        req = req.header("accept", if stream { "text/event-stream" } else { "application/json" });
        req.json(&body)
    }

    async fn send(&self, call: &GenerationCall, stream: bool) -> Result<reqwest::Response, GatewayError> {
        let resp = self
            .build_request(call, stream)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(REQUEST_TIMEOUT)
                } else {
                    GatewayError::NetworkError(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, body));
        }
        Ok(resp)
    }
}

/// Request body for one call. A schema is passed as a strict `json_schema` response format.
pub fn build_request_body(registry: &ModelRegistry, call: &GenerationCall, stream: bool) -> Value {
    let model = registry.get(call.role);
    let mut body = json!({
        "model": model.name,
        "messages": call.messages,
        "stream": stream,
    });

    if let Some(temperature) = model.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = model.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(schema) = &call.output_schema {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema_name(&call.query_name),
                "schema": schema,
                "strict": true,
            }
        });
    }
    body
}

// Response format names are limited to [a-zA-Z0-9_-].
fn schema_name(query_name: &str) -> String {
    let name: String = query_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "output".to_string()
    } else {
        name
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model_for(&self, role: ModelRole) -> &str {
        &self.registry.get(role).name
    }

    #[instrument(skip(self, call), fields(query = %call.query_name, model = %self.model_for(call.role)))]
    async fn complete(&self, call: &GenerationCall) -> Result<String, GatewayError> {
        let resp = self.send(call, false).await?;
        let body: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("completion body: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::MalformedResponse("completion has no content".into()))
    }

    #[instrument(skip(self, call), fields(query = %call.query_name, model = %self.model_for(call.role)))]
    async fn stream(&self, call: &GenerationCall) -> Result<EventStream, GatewayError> {
        let resp = self.send(call, true).await?;
        Ok(Box::pin(SseStream::new(resp.bytes_stream())))
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Wraps a byte stream from reqwest and yields StreamEvents.
/// If no data arrives within `idle_duration`, emits an error.
struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    parser: ChunkParser,
    buffer: String,
    pending: Vec<StreamEvent>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    ended: bool,
}

impl SseStream {
    fn new(byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static) -> Self {
        Self::with_idle_timeout(byte_stream, SSE_IDLE_TIMEOUT)
    }

    fn with_idle_timeout(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: ChunkParser::new(),
            buffer: String::new(),
            pending: Vec::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            ended: false,
        }
    }

    fn feed(&mut self, chunk: &str) {
        for (_event, data) in sse::parse_sse_lines(chunk) {
            let events = self.parser.parse_data(&data);
            self.pending.extend(events);
        }
    }

    fn next_pending(&mut self) -> Option<StreamEvent> {
        if self.pending.is_empty() {
            return None;
        }
        let event = self.pending.remove(0);
        if event.is_terminal() {
            self.ended = true;
            self.pending.clear();
        }
        Some(event)
    }
}

impl Stream for SseStream {
    type Item = StreamEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        if let Some(event) = self.next_pending() {
            return std::task::Poll::Ready(Some(event));
        }
        if self.ended {
            return std::task::Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(bytes))) => {
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    let text = String::from_utf8_lossy(&bytes);
                    self.buffer.push_str(&text);

                    while let Some(pos) = self.buffer.find("\n\n") {
                        let chunk = self.buffer[..pos + 2].to_string();
                        self.buffer = self.buffer[pos + 2..].to_string();
                        self.feed(&chunk);
                    }

                    if let Some(event) = self.next_pending() {
                        return std::task::Poll::Ready(Some(event));
                    }
                }
                std::task::Poll::Ready(Some(Err(e))) => {
                    self.ended = true;
                    return std::task::Poll::Ready(Some(StreamEvent::Error {
                        error: GatewayError::StreamInterrupted(e.to_string()),
                    }));
                }
                std::task::Poll::Ready(None) => {
                    self.ended = true;
                    if !self.buffer.is_empty() {
                        let remaining = std::mem::take(&mut self.buffer);
                        self.feed(&remaining);
                    }
                    return std::task::Poll::Ready(self.next_pending());
                }
                std::task::Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        self.ended = true;
                        return std::task::Poll::Ready(Some(StreamEvent::Error {
                            error: GatewayError::StreamInterrupted(format!(
                                "idle timeout after {}s",
                                self.idle_duration.as_secs()
                            )),
                        }));
                    }
                    return std::task::Poll::Pending;
                }
            }
        }
    }
}
