//! Filesystem container store
//!
//! Each container is a single bincode document. Flushing writes a sibling
//! temporary file, syncs it and renames it over the container, so a
//! concurrent reader sees either the previous or the new state, never a
//! partial write. Nothing is written until a new container's first flush.
//! Every call blocks on `std::fs`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use contracts::ContractError;
use tracing::{debug, instrument};

use crate::array::{DatasetLayout, Scalar};
use crate::document::{ContainerDocument, VirtualDataset};
use crate::handles::{HandleCounter, HandleToken};
use crate::store::{ArrayReader, ContainerStore, ContainerWriter, Result};

/// Store of containers on the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsStore {
    handles: HandleCounter,
}

impl FsStore {
    /// Create a store
    pub fn new() -> Self {
        Self::default()
    }
}

fn read_document(path: &Path) -> Result<ContainerDocument> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ContractError::not_found(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    bincode::deserialize(&bytes)
        .map_err(|e| ContractError::storage(path.display().to_string(), e.to_string()))
}

fn write_document(path: &Path, document: &ContainerDocument) -> Result<()> {
    let bytes = bincode::serialize(document)
        .map_err(|e| ContractError::storage(path.display().to_string(), e.to_string()))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ContractError::storage(path.display().to_string(), "invalid file name"))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = File::create(&temp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&temp, path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "container published");
    Ok(())
}

impl ContainerStore for FsStore {
    type Reader = FsReader;
    type Writer = FsWriter;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    #[instrument(name = "fs_store_create", skip(self), fields(path = %path.display()))]
    fn create(&self, path: &Path, overwrite: bool) -> Result<FsWriter> {
        if path.exists() && !overwrite {
            return Err(ContractError::AlreadyInitialized {
                path: path.display().to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // The file appears on the first flush
        Ok(FsWriter {
            path: path.to_path_buf(),
            staged: ContainerDocument::default(),
            token: self.handles.open(),
        })
    }

    #[instrument(name = "fs_store_open_read", skip(self), fields(path = %path.display()))]
    fn open_read(&self, path: &Path) -> Result<FsReader> {
        let cache = read_document(path)?;
        Ok(FsReader {
            path: path.to_path_buf(),
            cache,
            token: self.handles.open(),
        })
    }

    #[instrument(name = "fs_store_open_append", skip(self), fields(path = %path.display()))]
    fn open_append(&self, path: &Path) -> Result<FsWriter> {
        let staged = read_document(path)?;
        Ok(FsWriter {
            path: path.to_path_buf(),
            staged,
            token: self.handles.open(),
        })
    }

    fn open_handles(&self) -> usize {
        self.handles.count()
    }
}

/// Read-only handle onto a container file
#[derive(Debug)]
pub struct FsReader {
    path: PathBuf,
    cache: ContainerDocument,
    token: HandleToken,
}

impl FsReader {
    fn ensure_open(&self) -> Result<()> {
        if self.token.is_open() {
            Ok(())
        } else {
            Err(ContractError::handle_closed(self.path.display().to_string()))
        }
    }
}

impl ArrayReader for FsReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn contains(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(read_document(&self.path)?.contains(name))
    }

    fn shape(&self, dataset: &str) -> Result<Vec<usize>> {
        self.ensure_open()?;
        Ok(self.cache.dataset(dataset)?.shape().to_vec())
    }

    fn refresh(&mut self, dataset: &str) -> Result<Vec<usize>> {
        self.ensure_open()?;
        let latest = read_document(&self.path)?;
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

/// Read-write handle onto a container file
#[derive(Debug)]
pub struct FsWriter {
    path: PathBuf,
    staged: ContainerDocument,
    token: HandleToken,
}

impl FsWriter {
    fn ensure_open(&self) -> Result<()> {
        if self.token.is_open() {
            Ok(())
        } else {
            Err(ContractError::handle_closed(self.path.display().to_string()))
        }
    }
}

impl ArrayReader for FsWriter {
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

impl ContainerWriter for FsWriter {
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
        self.staged.resize(dataset, shape)
    }

    fn write(&mut self, dataset: &str, index: &[usize], value: Scalar) -> Result<()> {
        self.ensure_open()?;
        self.staged.write(dataset, index, value)
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        write_document(&self.path, &self.staged)
    }
}
