//! RawSource handles
//!
//! Read view of one module's raw file, opened by attachment and closed by the
//! lifecycle manager.

use container::{ArrayReader, Scalar};
use contracts::{layout, ContractError};

/// Attached raw module file
#[derive(Debug)]
pub struct RawSource<R: ArrayReader> {
    module: usize,
    reader: R,
}

impl<R: ArrayReader> RawSource<R> {
    /// Wrap an opened reader for a 1-based module ordinal
    pub fn new(module: usize, reader: R) -> Self {
        Self { module, reader }
    }

    /// Module ordinal
    pub fn module(&self) -> usize {
        self.module
    }

    /// Pull the writer's latest id extent
    pub fn refresh_ids(&mut self) -> Result<Vec<usize>, ContractError> {
        self.reader.refresh(layout::UNIQUE_ID_PATH)
    }

    /// Pull the writer's latest sum extent
    pub fn refresh_sums(&mut self) -> Result<Vec<usize>, ContractError> {
        self.reader.refresh(layout::SUM_PATH)
    }

    /// Whether the writer has published its id array yet
    pub fn has_id_array(&self) -> Result<bool, ContractError> {
        self.reader.contains(layout::UNIQUE_ID_PATH)
    }

    /// Whether `coordinate` lies inside the observed id extent
    pub fn has_id(&self, coordinate: &[usize]) -> Result<bool, ContractError> {
        Ok(in_range(&self.reader.shape(layout::UNIQUE_ID_PATH)?, coordinate))
    }

    /// Whether `coordinate` lies inside the observed sum extent
    pub fn has_sum(&self, coordinate: &[usize]) -> Result<bool, ContractError> {
        Ok(in_range(&self.reader.shape(layout::SUM_PATH)?, coordinate))
    }

    /// Observed id extent
    pub fn id_shape(&self) -> Result<Vec<usize>, ContractError> {
        self.reader.shape(layout::UNIQUE_ID_PATH)
    }

    /// Unique id reported for a scan point
    pub fn read_id(&self, coordinate: &[usize]) -> Result<i64, ContractError> {
        self.reader
            .read(layout::UNIQUE_ID_PATH, coordinate)?
            .as_i64()
            .ok_or_else(|| ContractError::TypeMismatch {
                dataset: layout::UNIQUE_ID_PATH.to_string(),
                expected: "integer".to_string(),
            })
    }

    /// Partial sum reported for a scan point
    pub fn read_sum(&self, coordinate: &[usize]) -> Result<f64, ContractError> {
        self.reader
            .read(layout::SUM_PATH, coordinate)
            .map(Scalar::as_f64)
    }

    /// Raw file location
    pub fn path(&self) -> &std::path::Path {
        self.reader.path()
    }

    /// Whether the underlying handle is open
    pub fn is_open(&self) -> bool {
        self.reader.is_open()
    }

    /// Release the handle, true only on the first call
    pub fn close(&mut self) -> bool {
        self.reader.close()
    }
}

/// Whether a scan coordinate addresses an element of an array of `shape`
///
/// The coordinate covers the leading dimensions; trailing dimensions are
/// addressed at 0 and only need a non-zero extent.
pub fn in_range(shape: &[usize], coordinate: &[usize]) -> bool {
    coordinate.len() <= shape.len()
        && coordinate.iter().zip(shape).all(|(i, len)| i < len)
        && shape[coordinate.len()..].iter().all(|&len| len > 0)
}
