//! Error types for CLI operations.

use contracts::ContractError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ContractError),

    /// Requested steps do not fit the scan
    #[error("Cannot synchronize {steps} steps after {completed}: scan has {size} points")]
    StepsOutOfRange { completed: u64, steps: u64, size: usize },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
