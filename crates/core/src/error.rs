use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuizgenError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Upstream request to {url} timed out after {timeout_ms}ms")]
    UpstreamTimeout { url: String, timeout_ms: u64 },

    #[error("Upstream at {url} is unavailable: {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    #[error("Upstream returned an error (status {status:?}): {message}")]
    UpstreamError {
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuizgenError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// True for failures of the request itself, as opposed to its payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. } | Self::UpstreamUnavailable { .. } | Self::UpstreamError { .. }
        )
    }

    /// Timeouts, refused connections, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamTimeout { .. } | Self::UpstreamUnavailable { .. } => true,
            Self::UpstreamError {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, QuizgenError>;
