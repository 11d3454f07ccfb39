//! Error Handling Module
//!
//! Defines custom error types for the theraphosid library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error as ThisError;

/// Main error type for theraphosid operations
#[derive(ThisError, Debug)]
pub enum Error {
    /// Error loading or processing an image
    #[error("Failed to load image at {0:?}: {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Training diverged or otherwise failed
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model and catalog disagree; the pair must never be served
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Remote checkpoint could not be acquired
    #[error("Model unavailable: {0}")]
    Fetch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Path not found
    #[error("Path not found: {0:?}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for theraphosid operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Dataset("no class directories".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no class directories");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/data/poecilotheria_metallica/img.jpg");
        let err = Error::ImageLoad(path, "decode failed".to_string());
        assert!(format!("{}", err).contains("img.jpg"));
    }

    #[test]
    fn test_fetch_error_message() {
        let err = Error::Fetch("download incomplete".to_string());
        assert!(format!("{}", err).starts_with("Model unavailable"));
    }
}
