//! Error types for the attendance anomaly detection service.

use thiserror::Error;

/// Result type alias for detection operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the detection pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Timestamp or payload parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Statistical model fit/score error
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal pipeline error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
