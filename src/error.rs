//! Error types for promptforge

use thiserror::Error;

/// Result type alias for promptforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for promptforge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (unknown model family, malformed API key,
    /// invalid template kind). Never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reported by a hosted provider or the serving engine
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from the local inference engine
    #[error("Model error: {0}")]
    Model(#[from] candle_core::Error),

    /// Tokenizer load or encode/decode failure
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a tokenizer error
    pub fn tokenizer(msg: impl Into<String>) -> Self {
        Self::Tokenizer(msg.into())
    }
}
