//! Error Handling Module
//!
//! Defines the error type shared by the data pipeline, the training loop
//! and the evaluator. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for salient_trainer operations
#[derive(Error, Debug)]
pub enum SaliencyError {
    /// Inconsistent or invalid configuration (mismatched file counts, bad values)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A sample file could not be opened or decoded
    #[error("Missing or unreadable file '{0}': {1}")]
    MissingFile(PathBuf, String),

    /// Checkpoint could not be read or does not fit the model
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Error during the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Error during inference or evaluation
    #[error("Inference error: {0}")]
    Inference(String),

    /// Failed to write an output image
    #[error("Failed to write image '{0}': {1}")]
    ImageWrite(PathBuf, String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SaliencyError {
    fn from(err: serde_json::Error) -> Self {
        SaliencyError::Serialization(err.to_string())
    }
}

/// Convenience Result type for salient_trainer operations
pub type Result<T> = std::result::Result<T, SaliencyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SaliencyError::Configuration("3 images but 2 masks".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: 3 images but 2 masks"
        );
    }

    #[test]
    fn test_missing_file_error() {
        let path = PathBuf::from("/data/DUTS/Train/images/0001.jpg");
        let err = SaliencyError::MissingFile(path, "file not found".to_string());
        assert!(format!("{}", err).contains("0001.jpg"));
    }
}
