//! Call forms on top of [`GenerationBackend`]: immediate or streamed, text or structured.
//!
//! A call that carries an `output_schema` yields [`Generated::Structured`]; the body is
//! parsed as JSON here. Checking the value against the schema is the caller's concern.

use serde_json::Value;

use crate::errors::GatewayError;
use crate::provider::{GenerationBackend, GenerationCall};
use crate::stream;

#[derive(Clone, Debug, PartialEq)]
pub enum Generated {
    Text(String),
    Structured(Value),
}

impl Generated {
    pub fn into_text(self) -> Result<String, GatewayError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Structured(_) => Err(GatewayError::MalformedResponse(
                "expected text, got structured value".into(),
            )),
        }
    }

    pub fn into_structured(self) -> Result<Value, GatewayError> {
        match self {
            Self::Structured(value) => Ok(value),
            Self::Text(_) => Err(GatewayError::MalformedResponse(
                "expected structured value, got text".into(),
            )),
        }
    }
}

/// Immediate form.
pub async fn query(
    backend: &dyn GenerationBackend,
    call: &GenerationCall,
) -> Result<Generated, GatewayError> {
    let body = backend.complete(call).await?;
    finish(call, body)
}

/// Streaming-accumulation form. The stream is fully drained before a structured value
/// is produced.
pub async fn query_streamed(
    backend: &dyn GenerationBackend,
    call: &GenerationCall,
) -> Result<Generated, GatewayError> {
    let events = backend.stream(call).await?;
    let body = stream::accumulate(events).await?;
    finish(call, body)
}

fn finish(call: &GenerationCall, body: String) -> Result<Generated, GatewayError> {
    if call.output_schema.is_some() {
        parse_structured(&body).map(Generated::Structured)
    } else {
        Ok(Generated::Text(body))
    }
}

/// Parse a JSON body, tolerating a surrounding markdown code fence.
pub fn parse_structured(body: &str) -> Result<Value, GatewayError> {
    let trimmed = strip_code_fence(body.trim());
    serde_json::from_str(trimmed).map_err(|e| {
        GatewayError::MalformedResponse(format!("response is not valid JSON: {e}"))
    })
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json() {
        let value = parse_structured(r#" {"a": 1} "#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn parses_fenced_json() {
        let value = parse_structured("```json\n{\"a\": [1, 2]}\n```").unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));

        let value = parse_structured("```\n{\"b\": true}\n```").unwrap();
        assert_eq!(value, json!({"b": true}));
    }

    #[test]
    fn rejects_prose() {
        let err = parse_structured("Sure! Here is your outline.").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[test]
    fn generated_accessors() {
        assert_eq!(Generated::Text("x".into()).into_text().unwrap(), "x");
        assert!(Generated::Text("x".into()).into_structured().is_err());
        assert_eq!(
            Generated::Structured(json!(1)).into_structured().unwrap(),
            json!(1)
        );
        assert!(Generated::Structured(json!(1)).into_text().is_err());
    }
}
