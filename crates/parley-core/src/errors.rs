use std::time::Duration;

/// Typed error hierarchy for generation backend calls.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown model role: {0}")]
    UnknownModel(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("backend overloaded")]
    Overloaded,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The backend answered, but the body could not be read as the requested shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnknownModel(_) => "unknown_model",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Overloaded => "overloaded",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            503 | 529 => Self::Overloaded,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            GatewayError::from_status(401, "unauthorized".into()),
            GatewayError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            GatewayError::from_status(422, "schema".into()),
            GatewayError::InvalidRequest(_)
        ));
        assert!(matches!(
            GatewayError::from_status(429, String::new()),
            GatewayError::RateLimited { retry_after: None }
        ));
        assert!(matches!(GatewayError::from_status(503, String::new()), GatewayError::Overloaded));
        assert!(matches!(
            GatewayError::from_status(502, "bad gateway".into()),
            GatewayError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            GatewayError::from_status(302, "moved".into()),
            GatewayError::InvalidRequest(msg) if msg.contains("302")
        ));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(GatewayError::Cancelled.error_kind(), "cancelled");
        assert_eq!(
            GatewayError::MalformedResponse("x".into()).error_kind(),
            "malformed_response"
        );
        assert_eq!(
            GatewayError::Timeout(Duration::from_secs(1)).error_kind(),
            "timeout"
        );
    }

    #[test]
    fn display_carries_detail() {
        let err = GatewayError::ServerError { status: 500, body: "boom".into() };
        assert_eq!(err.to_string(), "server error 500: boom");
    }
}
