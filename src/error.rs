//! Error types for the forecast_rnn crate

use thiserror::Error;

/// Custom error types for the forecast_rnn crate
#[derive(Debug, Error)]
pub enum EngineError {
    /// Required training tensors were not supplied by the caller
    #[error("Missing data: {0}")]
    MissingData(String),

    /// The supplied dataset contains zero samples
    #[error("Empty dataset: training requires at least one sample")]
    EmptyDataset,

    /// A required inference input was not supplied by the caller
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Another operation is already in flight on this session
    #[error("Session busy: {0} rejected while another operation is in flight")]
    Busy(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Numeric failure during a training run
    #[error("Training failure: {0}")]
    Training(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from weight snapshot serialization
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, EngineError>;
