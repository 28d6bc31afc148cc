//! Engine error types

use contracts::ContractError;
use thiserror::Error;

/// Failures that end a lifecycle hook
///
/// Transient conditions (missing data, stalled modules, cancellation) are
/// reported as outcomes, not errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A raw file or its id array did not appear in time
    #[error("gave up after {waited_ms} ms waiting for '{path}'")]
    AttachTimeout { path: String, waited_ms: u64 },

    /// Hook requires a prior `configure`
    #[error("engine is not configured")]
    NotConfigured,

    /// Requested target lies beyond the scan
    #[error("target index {target} exceeds scan size {size}")]
    InvalidTarget { target: u64, size: usize },

    /// Storage or array failure during a hook (fatal to the run)
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Result alias
pub type Result<T> = std::result::Result<T, SyncError>;
