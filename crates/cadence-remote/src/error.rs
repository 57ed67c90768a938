/// Typed error hierarchy for remote store operations.
/// Retryable failures leave an item in its dirty/queued state for the next
/// pass; auth failures abort the pass so the caller can re-authenticate.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RemoteError {
    // Not retried silently
    #[error("authentication failed: {0}")]
    Unauthorized(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),

    // Retryable on the next pass
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Serialization(String),
}

impl RemoteError {
    /// Whether the item should stay queued/flagged for the next sync pass.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServerError { .. } | Self::Network(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::ServerError { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::Serialization(_) => "malformed_response",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(body),
            404 => Self::NotFound(body),
            400 => Self::InvalidRequest(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Serialization(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
