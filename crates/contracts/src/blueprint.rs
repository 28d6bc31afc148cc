//! AcquisitionBlueprint - Config Loader output
//!
//! Describes one stitched acquisition: detector modules, output location,
//! scan geometry and synchronization tuning.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::layout::expand_template;
use crate::GridScan;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Detector module layout
    pub detector: DetectorConfig,

    /// Output container settings
    pub output: OutputConfig,

    /// Scan geometry
    pub scan: GridScan,

    /// Polling and tolerance settings
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Detector module configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Output name, also the logical dataset prefix
    #[serde(default = "default_detector_name")]
    pub name: String,

    /// Number of independently written modules
    pub modules: usize,

    /// Raw file stem template, `{}` is the 1-based module ordinal
    #[serde(default = "default_raw_template")]
    pub raw_template: String,

    /// Payload element type
    #[serde(default)]
    pub data_type: ElementType,

    /// Per-module frame shape (e.g. stripe height, stripe width)
    pub record_shape: Vec<usize>,

    /// Trailing dimensions of the per-point attribute arrays
    #[serde(default = "default_attribute_shape")]
    pub attribute_shape: Vec<usize>,
}

fn default_detector_name() -> String {
    "EXCALIBUR".to_string()
}

fn default_raw_template() -> String {
    "FEM{}".to_string()
}

fn default_attribute_shape() -> Vec<usize> {
    vec![1, 1]
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding raw and stitched files
    pub directory: PathBuf,

    /// File name template, `{}` is the stem
    #[serde(default = "default_file_template")]
    pub file_template: String,

    /// Fill value for unwritten payload cells
    #[serde(default)]
    pub fill_value: i32,

    /// Replace an existing stitched file instead of failing
    #[serde(default)]
    pub overwrite: bool,
}

fn default_file_template() -> String {
    "{}.h5".to_string()
}

/// Synchronization tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Non-advancing observations tolerated per tick
    #[serde(default = "default_missed_tolerance")]
    pub missed_tolerance: u32,

    /// Sleep between synchronization ticks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Sleep while waiting for a raw file to be created
    #[serde(default = "default_file_poll_interval_ms")]
    pub file_poll_interval_ms: u64,

    /// Sleep while waiting for the id array inside a raw file
    #[serde(default = "default_dataset_poll_interval_ms")]
    pub dataset_poll_interval_ms: u64,

    /// Give up attaching after this long (None = wait until cancelled)
    #[serde(default)]
    pub attach_timeout_ms: Option<u64>,
}

fn default_missed_tolerance() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_file_poll_interval_ms() -> u64 {
    1000
}

fn default_dataset_poll_interval_ms() -> u64 {
    100
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            missed_tolerance: default_missed_tolerance(),
            poll_interval_ms: default_poll_interval_ms(),
            file_poll_interval_ms: default_file_poll_interval_ms(),
            dataset_poll_interval_ms: default_dataset_poll_interval_ms(),
            attach_timeout_ms: None,
        }
    }
}

impl SyncConfig {
    /// Inter-tick sleep
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Raw file existence poll
    pub fn file_poll_interval(&self) -> Duration {
        Duration::from_millis(self.file_poll_interval_ms)
    }

    /// Id array existence poll
    pub fn dataset_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dataset_poll_interval_ms)
    }

    /// Attachment deadline, if any
    pub fn attach_timeout(&self) -> Option<Duration> {
        self.attach_timeout_ms.map(Duration::from_millis)
    }
}

/// Numeric element type of the detector payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Int8,
    Uint8,
    Int16,
    #[default]
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl ElementType {
    /// Whether values of this type are stored as integers
    pub fn is_integer(self) -> bool {
        !matches!(self, Self::Float32 | Self::Float64)
    }
}

impl AcquisitionBlueprint {
    /// Stitched file name, relative to the output directory
    pub fn output_filename(&self) -> String {
        expand_template(&self.output.file_template, &self.detector.name)
    }

    /// Raw file name of a 1-based module ordinal
    pub fn raw_filename(&self, module: usize) -> String {
        let stem = expand_template(&self.detector.raw_template, &module.to_string());
        expand_template(&self.output.file_template, &stem)
    }

    /// Absolute-or-relative path of the stitched file
    pub fn output_path(&self) -> PathBuf {
        self.output.directory.join(self.output_filename())
    }

    /// Raw file paths, ordered by module ordinal
    pub fn raw_paths(&self) -> Vec<PathBuf> {
        (1..=self.detector.modules)
            .map(|module| self.output.directory.join(self.raw_filename(module)))
            .collect()
    }
}
