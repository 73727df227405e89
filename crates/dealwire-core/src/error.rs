use thiserror::Error;

/// Application-wide error types for dealwire.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Redirect chain exceeded the hop limit or looped.
    #[error("Too many redirects for {0}")]
    RedirectLimit(String),

    /// Feed body could not be parsed as RSS, Atom, or JSON Feed.
    #[error("Feed parse error: {0}")]
    FeedParseError(String),

    /// Headless rendering failed or is unavailable.
    #[error("Render error: {0}")]
    RenderError(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Writing the snapshot failed.
    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Work was cancelled before it finished.
    #[error("Cancelled")]
    Cancelled,

    /// The run deadline fired before any output could be assembled.
    #[error("Run deadline exceeded before assembly")]
    DeadlineExceeded,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::SnapshotError(e.to_string())
    }
}
