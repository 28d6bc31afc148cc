//! DatasetDescriptor - skeleton builder output
//!
//! Describes each dataset the stitched file produces or references, for use by
//! an external dataset catalog.

use serde::{Deserialize, Serialize};

/// Role of a dataset in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    /// Main detector payload
    Primary,
    /// Derived per-point data (aggregate sum)
    Secondary,
    /// Demanded position of a scan axis
    PositionSet,
}

/// Catalog entry for one produced or referenced dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Logical name, e.g. `EXCALIBUR.data` or `x.value_set`
    pub name: String,

    /// Container file name relative to the output directory
    pub filename: String,

    /// Dataset role
    pub dataset_type: DatasetType,

    /// Total rank (scan dimensions plus record dimensions)
    pub rank: usize,

    /// Container-relative dataset path
    pub path: String,

    /// Path of the unique-id array that marks points valid (empty if none)
    pub uniqueid: String,
}
