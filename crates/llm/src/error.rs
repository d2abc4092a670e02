use thiserror::Error;

/// Failure taxonomy shared by every chat backend.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Foundation Models requires macOS")]
    NotMacos,

    #[error("FM bridge binary not found at {0}")]
    BridgeNotFound(String),

    #[error("FM bridge server not running at {0}")]
    ServerNotRunning(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Request failed{}: {message}", match .status { Some(s) => format!(" (HTTP {s})"), None => String::new() })]
    RequestFailed {
        /// HTTP status when the server answered; `None` for network errors
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl LlmError {
    pub fn request_failed(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Retry predicate over the normalized error shape: network failures,
    /// 5xx, 429, and timeouts are retryable; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::RequestFailed { status, .. } => match status {
                None => true,
                Some(429) => true,
                Some(s) => *s >= 500,
            },
            _ => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout(std::time::Duration::ZERO);
        }
        Self::RequestFailed {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_predicate() {
        assert!(LlmError::request_failed(Some(503), "unavailable").is_retryable());
        assert!(LlmError::request_failed(Some(429), "rate limited").is_retryable());
        assert!(LlmError::request_failed(None, "connection reset").is_retryable());
        assert!(LlmError::Timeout(std::time::Duration::from_secs(1)).is_retryable());

        assert!(!LlmError::request_failed(Some(401), "bad key").is_retryable());
        assert!(!LlmError::request_failed(Some(400), "bad request").is_retryable());
        assert!(!LlmError::InvalidResponse("garbage".into()).is_retryable());
        assert!(!LlmError::ModelUnavailable("x".into()).is_retryable());
    }
}
