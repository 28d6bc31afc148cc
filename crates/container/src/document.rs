//! In-memory image of one container
//!
//! Groups, external links and datasets keyed by absolute container path.
//! Both stores stage writes on a private document and publish it on flush.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use contracts::{ContractError, ElementType};

use crate::array::{DatasetLayout, NdArray, Scalar};

/// Structural reference into another container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    /// Target file, relative to the linking container's directory
    pub file: String,
    /// Path inside the target file
    pub path: String,
}

/// One source region of a virtual dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualSource {
    /// Where the region's data lives
    pub link: ExternalLink,
    /// Position of the region's first element in the virtual dataset
    pub offset: Vec<usize>,
    /// Extent of the region
    pub shape: Vec<usize>,
}

/// Dataset assembled from regions of other containers, no data copied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDataset {
    /// Full extent
    pub shape: Vec<usize>,
    /// Element type of every source
    pub data_type: ElementType,
    /// Value reported for cells no source covers
    pub fill_value: i32,
    /// Mapped regions
    pub sources: Vec<VirtualSource>,
}

impl VirtualDataset {
    /// Check every region lies inside the virtual extent
    pub fn validate(&self) -> Result<(), String> {
        for (n, source) in self.sources.iter().enumerate() {
            if source.offset.len() != self.shape.len() || source.shape.len() != self.shape.len() {
                return Err(format!("source {n} rank does not match rank {}", self.shape.len()));
            }
            let fits = source
                .offset
                .iter()
                .zip(&source.shape)
                .zip(&self.shape)
                .all(|((offset, len), total)| offset + len <= *total);
            if !fits {
                return Err(format!("source {n} exceeds shape {:?}", self.shape));
            }
        }
        Ok(())
    }
}

/// Complete container contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerDocument {
    groups: BTreeSet<String>,
    links: BTreeMap<String, ExternalLink>,
    datasets: BTreeMap<String, NdArray>,
    virtuals: BTreeMap<String, VirtualDataset>,
}

impl ContainerDocument {
    /// Whether a group, link or dataset exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.groups.contains(path)
            || self.links.contains_key(path)
            || self.datasets.contains_key(path)
            || self.virtuals.contains_key(path)
    }

    /// Whether a group exists at `path`
    pub fn has_group(&self, path: &str) -> bool {
        self.groups.contains(path)
    }

    /// External link installed at `path`
    pub fn link(&self, path: &str) -> Option<&ExternalLink> {
        self.links.get(path)
    }

    /// Number of installed links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Virtual dataset at `path`
    pub fn virtual_dataset(&self, path: &str) -> Option<&VirtualDataset> {
        self.virtuals.get(path)
    }

    /// Dataset at `path`
    pub fn dataset(&self, path: &str) -> Result<&NdArray, ContractError> {
        self.datasets
            .get(path)
            .ok_or_else(|| ContractError::not_found(path))
    }

    /// Mutable dataset at `path`
    pub fn dataset_mut(&mut self, path: &str) -> Result<&mut NdArray, ContractError> {
        self.datasets
            .get_mut(path)
            .ok_or_else(|| ContractError::not_found(path))
    }

    /// Replace one dataset with `other`'s copy
    ///
    /// Returns false when `other` does not hold the dataset.
    pub fn sync_dataset_from(&mut self, other: &ContainerDocument, path: &str) -> bool {
        match other.datasets.get(path) {
            Some(array) => {
                self.datasets.insert(path.to_string(), array.clone());
                true
            }
            None => false,
        }
    }

    /// Create `path` and every missing parent group
    pub fn require_group(&mut self, path: &str) -> Result<(), ContractError> {
        let path = normalize(path)?;
        if self.contains(&path) && !self.groups.contains(&path) {
            return Err(ContractError::storage(path, "a non-group object exists here"));
        }
        for parent in ancestors(&path) {
            self.groups.insert(parent);
        }
        self.groups.insert(path);
        Ok(())
    }

    /// Install an external link, creating parent groups
    pub fn link_external(
        &mut self,
        path: &str,
        file: &str,
        target: &str,
    ) -> Result<(), ContractError> {
        let path = normalize(path)?;
        if self.contains(&path) {
            return Err(ContractError::storage(path, "object already exists"));
        }
        self.require_parents(&path);
        self.links.insert(
            path,
            ExternalLink {
                file: file.to_string(),
                path: target.to_string(),
            },
        );
        Ok(())
    }

    /// Create a dataset, creating parent groups
    pub fn create_dataset(
        &mut self,
        path: &str,
        layout: DatasetLayout,
    ) -> Result<(), ContractError> {
        let path = normalize(path)?;
        if self.contains(&path) {
            return Err(ContractError::storage(path, "object already exists"));
        }
        let array = NdArray::new(layout).map_err(|e| e.into_contract(&path))?;
        self.require_parents(&path);
        self.datasets.insert(path, array);
        Ok(())
    }

    /// Create a virtual dataset, creating parent groups
    pub fn create_virtual(
        &mut self,
        path: &str,
        dataset: VirtualDataset,
    ) -> Result<(), ContractError> {
        let path = normalize(path)?;
        if self.contains(&path) {
            return Err(ContractError::storage(path, "object already exists"));
        }
        dataset.validate().map_err(|message| ContractError::ShapeMismatch {
            dataset: path.clone(),
            message,
        })?;
        self.require_parents(&path);
        self.virtuals.insert(path, dataset);
        Ok(())
    }

    /// Resize a dataset
    pub fn resize(&mut self, path: &str, shape: &[usize]) -> Result<(), ContractError> {
        self.dataset_mut(path)?
            .resize(shape)
            .map_err(|e| e.into_contract(path))
    }

    /// Write one element
    pub fn write(
        &mut self,
        path: &str,
        index: &[usize],
        value: Scalar,
    ) -> Result<(), ContractError> {
        self.dataset_mut(path)?
            .set(index, value)
            .map_err(|e| e.into_contract(path))
    }

    /// Read one element
    pub fn read(&self, path: &str, index: &[usize]) -> Result<Scalar, ContractError> {
        self.dataset(path)?
            .get(index)
            .map_err(|e| e.into_contract(path))
    }

    fn require_parents(&mut self, path: &str) {
        for parent in ancestors(path) {
            self.groups.insert(parent);
        }
    }
}

fn normalize(path: &str) -> Result<String, ContractError> {
    let trimmed = path.trim_end_matches('/');
    if !trimmed.starts_with('/') || trimmed.len() < 2 {
        return Err(ContractError::storage(path, "paths must be absolute"));
    }
    Ok(trimmed.to_string())
}

/// Proper ancestors of an absolute path, excluding the root
fn ancestors(path: &str) -> Vec<String> {
    path.match_indices('/')
        .skip(1)
        .map(|(pos, _)| path[..pos].to_string())
        .collect()
}
