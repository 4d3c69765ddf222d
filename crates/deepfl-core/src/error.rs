//! Error types for fault-localization training.

use thiserror::Error;

/// Errors surfaced by dataset loading, model construction, and training.
#[derive(Debug, Error)]
pub enum DeepFlError {
    /// A feature row's width disagrees with the declared partition.
    #[error("Feature width mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Input validation failed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is missing, unparseable, or out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor computation failed.
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Summary record serialization failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fault-localization operations.
pub type DeepFlResult<T> = Result<T, DeepFlError>;
