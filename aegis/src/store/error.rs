//! Record store error types

use thiserror::Error;

/// Errors that can occur talking to the alert/user record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Store API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::ApiError { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            StoreError::NotFound(_) => false,
            StoreError::InvalidRecord(_) => false,
            StoreError::Unavailable(_) => true,
        }
    }
}
