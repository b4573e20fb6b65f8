//! Error types for Neural Implicit Flow models.

use thiserror::Error;

/// Result type alias for NIF operations
pub type Result<T> = std::result::Result<T, NifError>;

/// Main error type for NIF model construction and evaluation
#[derive(Error, Debug)]
pub enum NifError {
    /// Invalid or inconsistent configuration, detected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The flat parameter vector width disagrees with the weight-layout arithmetic
    #[error("Layout mismatch in {context}: expected {expected} elements, got {actual}")]
    LayoutMismatch {
        /// Element count computed from the shape-network configuration
        expected: usize,
        /// Element count actually observed on the tensor
        actual: usize,
        /// Which block arithmetic or tensor the disagreement was found in
        context: String,
    },

    /// Tensor operand dimensions are incompatible
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions
        expected: String,
        /// Actual dimensions
        actual: String,
    },

    /// Operation not available for this model variant
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NifError {
    /// Create an `InvalidConfig` error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        NifError::InvalidConfig(msg.into())
    }

    /// Create a `LayoutMismatch` error
    pub fn layout_mismatch(expected: usize, actual: usize, context: impl Into<String>) -> Self {
        NifError::LayoutMismatch {
            expected,
            actual,
            context: context.into(),
        }
    }

    /// Create a `DimensionMismatch` error
    pub fn dimension_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        NifError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an `Unsupported` error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        NifError::Unsupported(msg.into())
    }
}
