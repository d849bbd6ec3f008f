use futures::StreamExt;

use crate::errors::GatewayError;
use crate::provider::EventStream;

/// Events emitted while streaming a generation. Ordering contract:
///
/// Start → TextDelta* → Done
///
/// Error can appear at any point and ends the stream.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Start,
    TextDelta { delta: String },
    Done { text: String },
    Error { error: GatewayError },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Drain a stream into the complete response text.
///
/// `Done` carries the authoritative text when the backend provides one; otherwise the
/// concatenated deltas are used. A stream that ends without `Done` is an interruption.
pub async fn accumulate(mut stream: EventStream) -> Result<String, GatewayError> {
    let mut buffer = String::new();

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Start => {}
            StreamEvent::TextDelta { delta } => buffer.push_str(&delta),
            StreamEvent::Done { text } => {
                return Ok(if text.is_empty() { buffer } else { text });
            }
            StreamEvent::Error { error } => return Err(error),
        }
    }

    Err(GatewayError::StreamInterrupted(
        "stream ended without a done event".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn boxed(events: Vec<StreamEvent>) -> EventStream {
        Box::pin(stream::iter(events))
    }

    #[tokio::test]
    async fn accumulates_deltas_when_done_is_empty() {
        let text = accumulate(boxed(vec![
            StreamEvent::Start,
            StreamEvent::TextDelta { delta: "Hel".into() },
            StreamEvent::TextDelta { delta: "lo".into() },
            StreamEvent::Done { text: String::new() },
        ]))
        .await
        .unwrap();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn done_text_wins_over_deltas() {
        let text = accumulate(boxed(vec![
            StreamEvent::TextDelta { delta: "partial".into() },
            StreamEvent::Done { text: "complete".into() },
        ]))
        .await
        .unwrap();
        assert_eq!(text, "complete");
    }

    #[tokio::test]
    async fn error_event_propagates() {
        let result = accumulate(boxed(vec![
            StreamEvent::Start,
            StreamEvent::Error { error: GatewayError::Overloaded },
        ]))
        .await;
        assert!(matches!(result, Err(GatewayError::Overloaded)));
    }

    #[tokio::test]
    async fn missing_done_is_interruption() {
        let result = accumulate(boxed(vec![StreamEvent::TextDelta { delta: "x".into() }])).await;
        assert!(matches!(result, Err(GatewayError::StreamInterrupted(_))));
    }

    #[test]
    fn terminal_classification() {
        assert!(StreamEvent::Done { text: String::new() }.is_terminal());
        assert!(StreamEvent::Error { error: GatewayError::Cancelled }.is_terminal());
        assert!(!StreamEvent::Start.is_terminal());
    }
}
