//! Common error types for Rt estimation

use thiserror::Error;

/// Result type for estimation operations
pub type EstimateResult<T> = Result<T, EstimateError>;

/// Errors that can occur while serving an estimate
#[derive(Debug, Error)]
pub enum EstimateError {
    /// Malformed or insufficient input. No estimator call is made.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The estimator failed or returned an unusable result
    #[error("Estimation failed: {0}")]
    EstimationFailed(String),

    /// Estimator or prior configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EstimateError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            EstimateError::InvalidRequest(_) => 400,
            EstimateError::EstimationFailed(_) => 500,
            EstimateError::Config(_) => 500,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::EstimationFailed(msg.into())
    }
}
