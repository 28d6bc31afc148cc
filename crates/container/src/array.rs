//! Growable N-dimensional arrays
//!
//! Row-major storage with per-dimension maximum extents. Growing an array
//! keeps every existing element at its coordinate and fills new cells with
//! the array's fill value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use contracts::ContractError;

/// Single array element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    /// Integer value, if exactly representable
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(v),
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(v as i64),
            Self::Float(_) => None,
        }
    }

    /// Floating point value
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

/// Element storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ArrayValues {
    fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }
}

/// Creation parameters of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetLayout {
    /// Initial extent
    pub shape: Vec<usize>,
    /// Per-dimension bound, `None` = unlimited
    pub max_shape: Vec<Option<usize>>,
    /// Value of never-written cells, also selects the element kind
    pub fill: Scalar,
}

impl DatasetLayout {
    /// Layout bounded in every dimension
    pub fn bounded(shape: Vec<usize>, max_shape: Vec<usize>, fill: Scalar) -> Self {
        Self {
            shape,
            max_shape: max_shape.into_iter().map(Some).collect(),
            fill,
        }
    }

    /// Layout unlimited in every dimension
    pub fn unlimited(shape: Vec<usize>, fill: Scalar) -> Self {
        let max_shape = vec![None; shape.len()];
        Self {
            shape,
            max_shape,
            fill,
        }
    }
}

/// Array-level failure, mapped onto `ContractError` by the owning container
#[derive(Debug, Error, PartialEq)]
pub enum ArrayError {
    #[error("index {index:?} out of range for shape {shape:?}")]
    OutOfRange { index: Vec<usize>, shape: Vec<usize> },

    #[error("{0}")]
    Shape(String),

    #[error("expected {0} element")]
    Type(&'static str),
}

impl ArrayError {
    /// Attach the dataset path
    pub fn into_contract(self, dataset: &str) -> ContractError {
        match self {
            Self::OutOfRange { index, shape } => ContractError::OutOfRange {
                dataset: dataset.to_string(),
                index,
                shape,
            },
            Self::Shape(message) => ContractError::ShapeMismatch {
                dataset: dataset.to_string(),
                message,
            },
            Self::Type(expected) => ContractError::TypeMismatch {
                dataset: dataset.to_string(),
                expected: expected.to_string(),
            },
        }
    }
}

/// Growable row-major array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    shape: Vec<usize>,
    max_shape: Vec<Option<usize>>,
    fill: Scalar,
    values: ArrayValues,
}

impl NdArray {
    /// Allocate an array filled with the layout's fill value
    pub fn new(layout: DatasetLayout) -> Result<Self, ArrayError> {
        if layout.shape.len() != layout.max_shape.len() {
            return Err(ArrayError::Shape(format!(
                "rank {} does not match max rank {}",
                layout.shape.len(),
                layout.max_shape.len()
            )));
        }
        check_bounds(&layout.shape, &layout.max_shape)?;

        let len = layout.shape.iter().product();
        let values = match layout.fill {
            Scalar::Int(v) => ArrayValues::Int(vec![v; len]),
            Scalar::Float(v) => ArrayValues::Float(vec![v; len]),
        };

        Ok(Self {
            shape: layout.shape,
            max_shape: layout.max_shape,
            fill: layout.fill,
            values,
        })
    }

    /// Current extent
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Maximum extent
    pub fn max_shape(&self) -> &[Option<usize>] {
        &self.max_shape
    }

    /// Whether `index` addresses an existing element
    ///
    /// `index` may be shorter than the rank; omitted trailing dimensions are
    /// addressed at 0 and only need a non-zero extent.
    pub fn contains(&self, index: &[usize]) -> bool {
        index.len() <= self.shape.len()
            && index.iter().zip(&self.shape).all(|(i, len)| i < len)
            && self.shape[index.len()..].iter().all(|&len| len > 0)
    }

    /// Read one element
    pub fn get(&self, index: &[usize]) -> Result<Scalar, ArrayError> {
        let offset = self.offset(index)?;
        Ok(match &self.values {
            ArrayValues::Int(v) => Scalar::Int(v[offset]),
            ArrayValues::Float(v) => Scalar::Float(v[offset]),
        })
    }

    /// Write one element
    pub fn set(&mut self, index: &[usize], value: Scalar) -> Result<(), ArrayError> {
        let offset = self.offset(index)?;
        match (&mut self.values, value) {
            (ArrayValues::Int(v), Scalar::Int(x)) => v[offset] = x,
            (ArrayValues::Int(_), Scalar::Float(_)) => return Err(ArrayError::Type("integer")),
            (ArrayValues::Float(v), x) => v[offset] = x.as_f64(),
        }
        Ok(())
    }

    /// Change the extent, keeping existing elements in place
    pub fn resize(&mut self, new_shape: &[usize]) -> Result<(), ArrayError> {
        if new_shape.len() != self.shape.len() {
            return Err(ArrayError::Shape(format!(
                "cannot resize rank {} array to rank {}",
                self.shape.len(),
                new_shape.len()
            )));
        }
        check_bounds(new_shape, &self.max_shape)?;
        if new_shape == self.shape.as_slice() {
            return Ok(());
        }

        let mut resized = NdArray {
            shape: new_shape.to_vec(),
            max_shape: self.max_shape.clone(),
            fill: self.fill,
            values: match self.fill {
                Scalar::Int(v) => ArrayValues::Int(vec![v; new_shape.iter().product()]),
                Scalar::Float(v) => ArrayValues::Float(vec![v; new_shape.iter().product()]),
            },
        };

        let mut index = vec![0; self.shape.len()];
        for flat in 0..self.values.len() {
            unravel(flat, &self.shape, &mut index);
            if resized.contains(&index) {
                resized.set(&index, self.get(&index)?)?;
            }
        }

        *self = resized;
        Ok(())
    }

    fn offset(&self, index: &[usize]) -> Result<usize, ArrayError> {
        if !self.contains(index) {
            return Err(ArrayError::OutOfRange {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        Ok(index
            .iter()
            .chain(std::iter::repeat(&0))
            .zip(&self.shape)
            .fold(0, |offset, (i, len)| offset * len + i))
    }
}

fn check_bounds(shape: &[usize], max_shape: &[Option<usize>]) -> Result<(), ArrayError> {
    for (dim, (len, max)) in shape.iter().zip(max_shape).enumerate() {
        if let Some(max) = max {
            if len > max {
                return Err(ArrayError::Shape(format!(
                    "dimension {dim} extent {len} exceeds maximum {max}"
                )));
            }
        }
    }
    Ok(())
}

fn unravel(mut flat: usize, shape: &[usize], index: &mut [usize]) {
    for (dim, &len) in shape.iter().enumerate().rev() {
        index[dim] = flat % len;
        flat /= len;
    }
}
