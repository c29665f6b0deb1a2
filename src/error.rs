// src/error.rs
// Standardized error types for the bridge

use thiserror::Error;

/// Main error type for the bridge library
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("model not allowed: {0}")]
    ModelNotAllowed(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream scraping engine error: {0}")]
    Upstream(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("local fetch failed: {0}")]
    LocalFetchFailed(String),

    #[error("SPA shell detected: {0}")]
    SpaShellDetected(String),

    #[error("format needs server")]
    FormatNeedsServer,

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Convert to user-facing string for MCP tool boundaries
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Other(s)
    }
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            BridgeError::Cancelled
        } else {
            BridgeError::Other(err.to_string())
        }
    }
}

impl From<BridgeError> for String {
    fn from(err: BridgeError) -> Self {
        err.to_string()
    }
}
