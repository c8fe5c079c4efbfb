//! Risk service error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur talking to the risk/briefing service
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RiskError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RiskError::RateLimited { .. } => true,
            RiskError::ApiError { status, .. } => *status >= 500 || *status == 408,
            RiskError::Network(_) => true,
            RiskError::Timeout(_) => true,
            RiskError::InvalidResponse(_) => false,
            RiskError::Json(_) => false,
            RiskError::InvalidRequest(_) => false,
        }
    }
}
