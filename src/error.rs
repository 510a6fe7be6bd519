//! Error types for piisense.

use thiserror::Error;

/// Result type for piisense operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for piisense operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Entity construction rejected (inverted span, confidence out of range).
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// Configuration value out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Regex pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    Pattern(String),

    /// Model loading failed.
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Model inference failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Training pipeline error.
    #[error("Training error: {0}")]
    Training(String),

    /// Collaborator store error (feedback, dataset, registry).
    #[error("Store error: {0}")]
    Store(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid entity error.
    pub fn invalid_entity(msg: impl Into<String>) -> Self {
        Error::InvalidEntity(msg.into())
    }

    /// Create an invalid config error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create a pattern error.
    pub fn pattern(msg: impl Into<String>) -> Self {
        Error::Pattern(msg.into())
    }

    /// Create a model load error.
    pub fn model_load(msg: impl Into<String>) -> Self {
        Error::ModelLoad(msg.into())
    }

    /// Create an inference error.
    pub fn inference(msg: impl Into<String>) -> Self {
        Error::Inference(msg.into())
    }

    /// Create a training error.
    pub fn training(msg: impl Into<String>) -> Self {
        Error::Training(msg.into())
    }

    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }
}
