//! Layered error definitions
//!
//! Categorized by source: config / container / array / handle

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Container Errors =====
    /// Output skeleton already exists at this location
    #[error("container '{path}' is already initialized")]
    AlreadyInitialized { path: String },

    /// Container, group or dataset missing
    #[error("'{path}' not found")]
    NotFound { path: String },

    /// Backend failure (resize/write/flush/link)
    #[error("storage error on '{path}': {message}")]
    Storage { path: String, message: String },

    // ===== Array Errors =====
    /// Index outside the current extent
    #[error("index {index:?} out of range for '{dataset}' with shape {shape:?}")]
    OutOfRange {
        dataset: String,
        index: Vec<usize>,
        shape: Vec<usize>,
    },

    /// Requested shape incompatible with the dataset
    #[error("shape mismatch on '{dataset}': {message}")]
    ShapeMismatch { dataset: String, message: String },

    /// Element type differs from the requested one
    #[error("type mismatch on '{dataset}': expected {expected}")]
    TypeMismatch { dataset: String, expected: String },

    // ===== Handle Errors =====
    /// Operation on a closed handle
    #[error("handle for '{path}' is closed")]
    HandleClosed { path: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create storage error
    pub fn storage(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create not-found error
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create closed-handle error
    pub fn handle_closed(path: impl Into<String>) -> Self {
        Self::HandleClosed { path: path.into() }
    }
}
