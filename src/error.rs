//! Error type for the fitting engine.
//!
//! Only malformed input and impossible configurations are errors. Numerical
//! degeneracy inside the search is handled with [`crate::domain::FitOutcome`]
//! and never aborts a fit.

use thiserror::Error;

/// Errors returned by the public fitting API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("non-finite value in {what} at index {index}")]
    NonFinite { what: &'static str, index: usize },

    #[error("invalid uncertainty in {what} at index {index}: must be positive (sigz) or non-negative (sigx)")]
    InvalidUncertainty { what: &'static str, index: usize },

    #[error("insufficient observations: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("degenerate fit: design matrix is singular")]
    Degenerate,
}

impl FitError {
    /// True for errors caused by the shape or content of the observations.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            FitError::ShapeMismatch { .. }
                | FitError::NonFinite { .. }
                | FitError::InvalidUncertainty { .. }
                | FitError::InsufficientData { .. }
        )
    }
}
