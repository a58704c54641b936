use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Meld
#[derive(Error, Debug)]
pub enum MeldError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Query text was empty after trimming
    #[error("Query cannot be empty")]
    EmptyQuery,

    /// Requested result count is not usable
    #[error("top_k must be positive, got {0}")]
    InvalidTopK(usize),

    /// Fusion method name not recognised
    #[error("Unknown fusion method: {0}")]
    UnknownFusionMethod(String),

    /// Search type name not recognised
    #[error("Unknown search type: {0}")]
    UnknownSearchType(String),

    /// A backend retriever failed while searching
    #[error("Retriever {retriever} failed: {message}")]
    Backend { retriever: String, message: String },

    /// A backend retriever did not answer in time
    #[error("Retriever {retriever} timed out after {elapsed_ms}ms")]
    Timeout { retriever: String, elapsed_ms: u64 },

    /// A backend could not be constructed
    #[error(transparent)]
    Unavailable(#[from] BackendUnavailable),

    /// The async executor could not be started
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MeldError {
    /// Shorthand for a backend failure
    pub fn backend(retriever: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            retriever: retriever.into(),
            message: message.into(),
        }
    }
}

/// A backend that could not be brought up at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Backend {backend} unavailable: {reason}")]
pub struct BackendUnavailable {
    /// Key the backend would have been registered under
    pub backend: String,
    /// Why construction failed
    pub reason: String,
}

impl BackendUnavailable {
    pub fn new(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Meld operations
pub type Result<T> = std::result::Result<T, MeldError>;
