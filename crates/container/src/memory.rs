//! In-memory container store
//!
//! Backs unit and scenario tests, supports injecting failure scenarios.
//! Writers stage changes privately and publish them on `flush`; readers hold a
//! cached copy that only moves forward on `refresh`, so stale extents are
//! observable exactly as with a concurrently written file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::ContractError;
use tracing::instrument;

use crate::array::{DatasetLayout, Scalar};
use crate::document::{ContainerDocument, VirtualDataset};
use crate::handles::{HandleCounter, HandleToken};
use crate::store::{ArrayReader, ContainerStore, ContainerWriter, Result};

/// Injected failure scenarios
#[derive(Debug, Default, Clone)]
pub struct FailurePlan {
    /// Datasets whose resize should fail
    pub fail_resize: HashSet<String>,
    /// Datasets whose writes should fail
    pub fail_write: HashSet<String>,
    /// Fail every flush
    pub fail_flush: bool,
}

/// In-memory store shared by every handle cloned from it
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Published containers (path -> contents)
    files: Arc<Mutex<HashMap<PathBuf, ContainerDocument>>>,
    /// Failure scenarios
    failures: Arc<Mutex<FailurePlan>>,
    /// Open handle accounting
    handles: HandleCounter,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with failure scenarios
    pub fn with_failures(plan: FailurePlan) -> Self {
        let store = Self::default();
        store.set_failures(plan);
        store
    }

    /// Replace the failure scenarios
    pub fn set_failures(&self, plan: FailurePlan) {
        *lock(&self.failures) = plan;
    }

    /// Published contents of a container
    pub fn published(&self, path: &Path) -> Option<ContainerDocument> {
        lock(&self.files).get(path).cloned()
    }

    /// Number of containers in the store
    pub fn file_count(&self) -> usize {
        lock(&self.files).len()
    }

    fn load(&self, path: &Path) -> Result<ContainerDocument> {
        self.published(path)
            .ok_or_else(|| ContractError::not_found(path.display().to_string()))
    }

    fn publish(&self, path: &Path, document: ContainerDocument) {
        lock(&self.files).insert(path.to_path_buf(), document);
    }

    fn check(
        &self,
        predicate: impl FnOnce(&FailurePlan) -> bool,
        path: &str,
        what: &str,
    ) -> Result<()> {
        let plan = lock(&self.failures);
        if predicate(&*plan) {
            return Err(ContractError::storage(path, format!("injected {what} failure")));
        }
        Ok(())
    }
}

impl ContainerStore for MemoryStore {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn exists(&self, path: &Path) -> bool {
        lock(&self.files).contains_key(path)
    }

    #[instrument(name = "memory_store_create", skip(self), fields(path = %path.display()))]
    fn create(&self, path: &Path, overwrite: bool) -> Result<MemoryWriter> {
        if self.exists(path) && !overwrite {
            return Err(ContractError::AlreadyInitialized {
                path: path.display().to_string(),
            });
        }

        // Nothing is published until the first flush
        Ok(MemoryWriter {
            store: self.clone(),
            path: path.to_path_buf(),
            staged: ContainerDocument::default(),
            token: self.handles.open(),
        })
    }

    #[instrument(name = "memory_store_open_read", skip(self), fields(path = %path.display()))]
    fn open_read(&self, path: &Path) -> Result<MemoryReader> {
        let cache = self.load(path)?;
        Ok(MemoryReader {
            store: self.clone(),
            path: path.to_path_buf(),
            cache,
            token: self.handles.open(),
        })
    }

    #[instrument(name = "memory_store_open_append", skip(self), fields(path = %path.display()))]
    fn open_append(&self, path: &Path) -> Result<MemoryWriter> {
        let staged = self.load(path)?;
        Ok(MemoryWriter {
            store: self.clone(),
            path: path.to_path_buf(),
            staged,
            token: self.handles.open(),
        })
    }

    fn open_handles(&self) -> usize {
        self.handles.count()
    }
}

/// Read-only handle onto a published container
#[derive(Debug)]
pub struct MemoryReader {
    store: MemoryStore,
    path: PathBuf,
    cache: ContainerDocument,
    token: HandleToken,
}

impl MemoryReader {
    fn ensure_open(&self) -> Result<()> {
        if self.token.is_open() {
            Ok(())
        } else {
            Err(ContractError::handle_closed(self.path.display().to_string()))
        }
    }
}

impl ArrayReader for MemoryReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn contains(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.store.load(&self.path)?.contains(name))
    }

    fn shape(&self, dataset: &str) -> Result<Vec<usize>> {
        self.ensure_open()?;
        Ok(self.cache.dataset(dataset)?.shape().to_vec())
    }

    fn refresh(&mut self, dataset: &str) -> Result<Vec<usize>> {
        self.ensure_open()?;
        let latest = self.store.load(&self.path)?;
        if !self.cache.sync_dataset_from(&latest, dataset) {
            return Err(ContractError::not_found(dataset));
        }
        self.shape(dataset)
    }

    fn read(&self, dataset: &str, index: &[usize]) -> Result<Scalar> {
        self.ensure_open()?;
        self.cache.read(dataset, index)
    }

    fn is_open(&self) -> bool {
        self.token.is_open()
    }

    fn close(&mut self) -> bool {
        self.token.release()
    }
}

/// Read-write handle staging changes until flush
#[derive(Debug)]
pub struct MemoryWriter {
    store: MemoryStore,
    path: PathBuf,
    staged: ContainerDocument,
    token: HandleToken,
}

impl MemoryWriter {
    fn ensure_open(&self) -> Result<()> {
        if self.token.is_open() {
            Ok(())
        } else {
            Err(ContractError::handle_closed(self.path.display().to_string()))
        }
    }
}

impl ArrayReader for MemoryWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn contains(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.staged.contains(name))
    }

    fn shape(&self, dataset: &str) -> Result<Vec<usize>> {
        self.ensure_open()?;
        Ok(self.staged.dataset(dataset)?.shape().to_vec())
    }

    fn refresh(&mut self, dataset: &str) -> Result<Vec<usize>> {
        self.shape(dataset)
    }

    fn read(&self, dataset: &str, index: &[usize]) -> Result<Scalar> {
        self.ensure_open()?;
        self.staged.read(dataset, index)
    }

    fn is_open(&self) -> bool {
        self.token.is_open()
    }

    fn close(&mut self) -> bool {
        self.token.release()
    }
}

impl ContainerWriter for MemoryWriter {
    fn require_group(&mut self, group: &str) -> Result<()> {
        self.ensure_open()?;
        self.staged.require_group(group)
    }

    fn link_external(&mut self, link: &str, file: &str, target: &str) -> Result<()> {
        self.ensure_open()?;
        self.staged.link_external(link, file, target)
    }

    fn create_virtual(&mut self, dataset: &str, layout: VirtualDataset) -> Result<()> {
        self.ensure_open()?;
        self.staged.create_virtual(dataset, layout)
    }

    fn create_dataset(&mut self, dataset: &str, layout: DatasetLayout) -> Result<()> {
        self.ensure_open()?;
        self.staged.create_dataset(dataset, layout)
    }

    fn resize(&mut self, dataset: &str, shape: &[usize]) -> Result<()> {
        self.ensure_open()?;
        self.store
            .check(|plan| plan.fail_resize.contains(dataset), dataset, "resize")?;
        self.staged.resize(dataset, shape)
    }

    fn write(&mut self, dataset: &str, index: &[usize], value: Scalar) -> Result<()> {
        self.ensure_open()?;
        self.store
            .check(|plan| plan.fail_write.contains(dataset), dataset, "write")?;
        self.staged.write(dataset, index, value)
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        let path = self.path.display().to_string();
        self.store.check(|plan| plan.fail_flush, &path, "flush")?;
        self.store.publish(&self.path, self.staged.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
