//! Error types for multiple kernel learning

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MKLError {
    /// Malformed kernel specs, mismatched shapes or invalid hyperparameters.
    /// Always raised before any numerical work starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The dual sub-solver could not produce a solution. Aborts the fit.
    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(f64),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MKLError {
    /// Shorthand for building a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        MKLError::Configuration(msg.into())
    }

    /// Shorthand for building a solver error
    pub fn solver(msg: impl Into<String>) -> Self {
        MKLError::Solver(msg.into())
    }
}

impl From<serde_json::Error> for MKLError {
    fn from(err: serde_json::Error) -> Self {
        MKLError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MKLError>;
