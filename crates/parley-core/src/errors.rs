use std::time::Duration;

const OVERLOAD_BACKOFF: Duration = Duration::from_secs(5);

/// Typed error hierarchy for inference backend calls.
/// Classifies errors as fatal (don't retry), retryable, or operational.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    // Fatal
    #[error("context window exhausted: {0}")]
    ContextExhausted(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to clear backend context (status {0})")]
    ClearContextFailed(u16),
    #[error("model launch failed: {0}")]
    LaunchFailed(String),

    // Retryable
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("backend overloaded")]
    Overloaded,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    // Operational
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<BackendError>,
    },
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. }
                | Self::Overloaded
                | Self::NetworkError(_)
                | Self::StreamInterrupted(_)
                | Self::Timeout(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ContextExhausted(_)
                | Self::InvalidRequest(_)
                | Self::ClearContextFailed(_)
                | Self::LaunchFailed(_)
        )
    }

    /// Backoff the backend asked for, if any. An overloaded server gets a longer pause.
    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            Self::Overloaded => Some(OVERLOAD_BACKOFF),
            _ => None,
        }
    }

    /// True when the prompt no longer fits the model's context window.
    pub fn is_context_exhausted(&self) -> bool {
        match self {
            Self::ContextExhausted(_) => true,
            Self::RetriesExhausted { last, .. } => last.is_context_exhausted(),
            _ => false,
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ContextExhausted(_) => "context_exhausted",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ClearContextFailed(_) => "clear_context_failed",
            Self::LaunchFailed(_) => "launch_failed",
            Self::ServerError { .. } => "server_error",
            Self::Overloaded => "overloaded",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::MalformedChunk(_) => "malformed_chunk",
            Self::Timeout(_) => "timeout",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 if body.to_ascii_lowercase().contains("context") => Self::ContextExhausted(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            503 => Self::Overloaded,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_not_retryable() {
        let errors = [
            BackendError::ContextExhausted("full".into()),
            BackendError::InvalidRequest("bad".into()),
            BackendError::ClearContextFailed(500),
            BackendError::LaunchFailed("no binary".into()),
        ];
        for e in &errors {
            assert!(e.is_fatal(), "{e} should be fatal");
            assert!(!e.is_retryable(), "{e} should not be retryable");
        }
    }

    #[test]
    fn suggested_delay_only_for_overload() {
        assert_eq!(BackendError::Overloaded.suggested_delay(), Some(Duration::from_secs(5)));
        let se = BackendError::ServerError { status: 500, body: "err".into() };
        assert_eq!(se.suggested_delay(), None);
    }

    #[test]
    fn retryable_errors() {
        assert!(BackendError::NetworkError("reset".into()).is_retryable());
        assert!(BackendError::Overloaded.is_retryable());
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!BackendError::MalformedChunk("{".into()).is_retryable());
    }

    #[test]
    fn from_status_classifies_context_overflow() {
        let e = BackendError::from_status(400, "the request exceeds the available context size".into());
        assert!(e.is_context_exhausted());
        let e = BackendError::from_status(400, "missing prompt".into());
        assert!(matches!(e, BackendError::InvalidRequest(_)));
    }

    #[test]
    fn from_status_server_errors() {
        assert!(matches!(BackendError::from_status(503, String::new()), BackendError::Overloaded));
        assert!(matches!(
            BackendError::from_status(502, "gateway".into()),
            BackendError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn exhaustion_seen_through_retry_wrapper() {
        let e = BackendError::RetriesExhausted {
            attempts: 3,
            last: Box::new(BackendError::ContextExhausted("full".into())),
        };
        assert!(e.is_context_exhausted());
        assert_eq!(e.error_kind(), "retries_exhausted");
    }
}
