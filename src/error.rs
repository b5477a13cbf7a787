//! Error types for the optimizer and indicator code.

use thiserror::Error;

/// Result type alias for frontier-lab computations.
pub type Result<T> = std::result::Result<T, FrontierError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrontierError {
    /// Inputs have the wrong shape or size (asset count, matrix dimensions, trial count).
    #[error("Degenerate input: {reason}")]
    DegenerateInput { reason: String },

    /// A sampled portfolio has zero risk, so its Sharpe score is undefined.
    #[error("Singular risk: trial {trial} has zero volatility")]
    SingularRisk { trial: usize },

    #[error("Insufficient data: need at least {required} rows, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Data length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },
}

impl FrontierError {
    pub fn degenerate_input(reason: impl Into<String>) -> Self {
        Self::DegenerateInput {
            reason: reason.into(),
        }
    }

    pub fn singular_risk(trial: usize) -> Self {
        Self::SingularRisk { trial }
    }

    pub fn insufficient_data(required: usize, available: usize) -> Self {
        Self::InsufficientData {
            required,
            available,
        }
    }

    pub fn length_mismatch(expected: usize, actual: usize) -> Self {
        Self::LengthMismatch { expected, actual }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }
}
