use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Search API error: {0}")]
    SearchApi(String),

    #[error("Search API rejected request: {0}")]
    SearchRejected(String),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("LLM API rate limited: {0}")]
    RateLimited(String),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by retry decisions and reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout, rate limit or network fault. Safe to retry.
    Transient,
    /// Malformed input. Never retried.
    Validation,
    /// The caller abandoned the request.
    Cancelled,
    /// Anything else, including non-retryable upstream responses.
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::SearchApi(_)
            | AppError::RateLimited(_)
            | AppError::Transient(_)
            | AppError::Timeout(_)
            | AppError::Http(_) => ErrorKind::Transient,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::Config(_)
            | AppError::SearchRejected(_)
            | AppError::LlmApi(_)
            | AppError::Serialization(_)
            | AppError::Io(_)
            | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
