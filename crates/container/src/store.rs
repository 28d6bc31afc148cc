//! Container store abstraction
//!
//! Defines traits for opening the raw module files and the stitched output,
//! supporting the filesystem implementation and an in-memory store for testing.
//!
//! Visibility follows a write-then-flush discipline: a writer's changes become
//! observable to other handles only after `flush`, and a reader observes a
//! dataset's latest extent only after `refresh`.

use std::path::Path;

use contracts::ContractError;

use crate::array::{DatasetLayout, Scalar};
use crate::document::VirtualDataset;

/// Result alias
pub type Result<T> = std::result::Result<T, ContractError>;

/// Container store trait
///
/// One store serves every container under it; handles it returns own their
/// resources and release them through `close`.
///
/// Every operation is synchronous and may block on I/O. Callers on an async
/// runtime keep each call short (one point per write, one flush per point) or
/// move it to `tokio::task::spawn_blocking`.
pub trait ContainerStore: Send + Sync + 'static {
    /// Read-only handle
    type Reader: ArrayReader + 'static;
    /// Read-write handle
    type Writer: ContainerWriter + 'static;

    /// Whether a container exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Create an empty container
    ///
    /// Fails with `AlreadyInitialized` if one exists and `overwrite` is false.
    fn create(&self, path: &Path, overwrite: bool) -> Result<Self::Writer>;

    /// Open an existing container for concurrent-safe reading
    fn open_read(&self, path: &Path) -> Result<Self::Reader>;

    /// Open an existing container for appending
    fn open_append(&self, path: &Path) -> Result<Self::Writer>;

    /// Number of handles opened through this store and not yet closed
    fn open_handles(&self) -> usize;
}

/// Read access to one container
pub trait ArrayReader: Send {
    /// Container location
    fn path(&self) -> &Path;

    /// Whether a group, link or dataset is visible at `name`
    ///
    /// Always consults the latest published state.
    fn contains(&self, name: &str) -> Result<bool>;

    /// Cached extent of a dataset
    fn shape(&self, dataset: &str) -> Result<Vec<usize>>;

    /// Pull the latest published state of a dataset and return its extent
    fn refresh(&mut self, dataset: &str) -> Result<Vec<usize>>;

    /// Read one element from the cached state
    fn read(&self, dataset: &str, index: &[usize]) -> Result<Scalar>;

    /// Whether the handle is still open
    fn is_open(&self) -> bool;

    /// Release the handle
    ///
    /// Idempotent: returns true only for the call that actually closed it.
    fn close(&mut self) -> bool;
}

/// Read-write access to one container
pub trait ContainerWriter: ArrayReader {
    /// Create a group and its parents
    fn require_group(&mut self, group: &str) -> Result<()>;

    /// Install a structural reference to `target` inside `file`
    fn link_external(&mut self, link: &str, file: &str, target: &str) -> Result<()>;

    /// Create a dataset assembled from regions of other containers
    fn create_virtual(&mut self, dataset: &str, layout: VirtualDataset) -> Result<()>;

    /// Create a dataset
    fn create_dataset(&mut self, dataset: &str, layout: DatasetLayout) -> Result<()>;

    /// Change a dataset's extent
    fn resize(&mut self, dataset: &str, shape: &[usize]) -> Result<()>;

    /// Write one element
    fn write(&mut self, dataset: &str, index: &[usize], value: Scalar) -> Result<()>;

    /// Publish staged changes to readers
    fn flush(&mut self) -> Result<()>;
}
