use serde::Deserialize;

use parley_core::errors::GatewayError;
use parley_core::stream::StreamEvent;

const DONE_SENTINEL: &str = "[DONE]";

/// State machine for OpenAI-style chat-completion chunks.
#[derive(Default)]
pub struct ChunkParser {
    started: bool,
    finished: bool,
    text: String,
}

impl ChunkParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `data:` payload into zero or more StreamEvents.
    pub fn parse_data(&mut self, data: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        if data.trim() == DONE_SENTINEL {
            self.finished = true;
            if !self.started {
                events.push(StreamEvent::Start);
            }
            events.push(StreamEvent::Done {
                text: std::mem::take(&mut self.text),
            });
            return events;
        }

        let chunk: Chunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable chunk");
                return events;
            }
        };

        if let Some(err) = chunk.error {
            self.finished = true;
            events.push(StreamEvent::Error {
                error: classify_error(&err),
            });
            return events;
        }

        if !self.started {
            self.started = true;
            events.push(StreamEvent::Start);
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                self.text.push_str(&content);
                events.push(StreamEvent::TextDelta { delta: content });
            }
        }

        events
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

fn classify_error(err: &ErrorPayload) -> GatewayError {
    match err.code {
        Some(code) if (100..=599).contains(&code) => {
            GatewayError::from_status(code as u16, err.message.clone())
        }
        _ => GatewayError::ServerError {
            status: 500,
            body: err.message.clone(),
        },
    }
}

/// Parse raw SSE text into `(event_type, data)` pairs. Events without an `event:` line
/// are reported as `message`.
pub fn parse_sse_lines(raw: &str) -> Vec<(String, String)> {
    let mut events = Vec::new();
    let mut current_event = String::new();
    let mut current_data = String::new();
    let mut has_data = false;

    for line in raw.lines() {
        if let Some(event) = line.strip_prefix("event:") {
            current_event = event.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            if has_data {
                current_data.push('\n');
            }
            current_data.push_str(data.strip_prefix(' ').unwrap_or(data));
            has_data = true;
        } else if line.is_empty() && has_data {
            events.push((take_event(&mut current_event), std::mem::take(&mut current_data)));
            has_data = false;
        }
    }

    // Trailing event without blank line
    if has_data {
        events.push((take_event(&mut current_event), current_data));
    }

    events
}

fn take_event(current: &mut String) -> String {
    if current.is_empty() {
        "message".to_string()
    } else {
        std::mem::take(current)
    }
}

// --- Deserialization types for chat-completion chunks ---

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}
