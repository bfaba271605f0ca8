//! Backend client error types

use thiserror::Error;

/// Errors that can occur while talking to the analysis backend
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether the request was rejected before reaching the backend
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            ApiError::Network(_) | ApiError::Unavailable(_) => true,
            ApiError::Validation(_) | ApiError::InvalidResponse(_) | ApiError::Json(_) => false,
        }
    }
}
