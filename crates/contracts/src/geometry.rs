//! ScanGeometry - scan point addressing
//!
//! Maps a flat scan-point index onto the N-dimensional coordinate used to
//! address array elements in the raw and stitched files.

use serde::{Deserialize, Serialize};

/// N-dimensional array coordinate
pub type Coordinate = Vec<usize>;

/// Read-only scan geometry supplied by the point generator.
///
/// Immutable for the lifetime of one configured pass.
pub trait ScanGeometry: Send + Sync {
    /// Scan axis names, outermost first
    fn axes(&self) -> &[String];

    /// Scan dimensions, outermost first
    fn shape(&self) -> &[usize];

    /// Map a scan-point index to its coordinate, `None` past the last point
    fn coordinate(&self, index: usize) -> Option<Coordinate>;

    /// Total number of scan points
    fn size(&self) -> usize {
        self.shape().iter().product()
    }

    /// Number of scan dimensions
    fn rank(&self) -> usize {
        self.shape().len()
    }
}

/// Rectilinear grid scan
///
/// Points are visited in row-major order. With `snake` set, every odd pass of
/// an inner dimension is traversed in reverse, as a fly-scan would.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridScan {
    /// Axis names, outermost first
    pub axes: Vec<String>,
    /// Points per axis
    pub shape: Vec<usize>,
    /// Alternate direction of inner axes
    #[serde(default)]
    pub snake: bool,
}

impl GridScan {
    /// Create a row-major grid
    pub fn new(axes: Vec<String>, shape: Vec<usize>) -> Self {
        Self {
            axes,
            shape,
            snake: false,
        }
    }

    /// One-dimensional scan along a single axis
    pub fn line(axis: impl Into<String>, points: usize) -> Self {
        Self::new(vec![axis.into()], vec![points])
    }

    /// Enable snake traversal
    pub fn with_snake(mut self, snake: bool) -> Self {
        self.snake = snake;
        self
    }
}

impl ScanGeometry for GridScan {
    fn axes(&self) -> &[String] {
        &self.axes
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn coordinate(&self, index: usize) -> Option<Coordinate> {
        if self.shape.is_empty() || index >= self.size() {
            return None;
        }

        let mut coordinate = vec![0; self.shape.len()];
        let mut remainder = index;
        for (dim, &len) in self.shape.iter().enumerate().rev() {
            coordinate[dim] = remainder % len;
            remainder /= len;
        }

        if self.snake {
            // An inner dimension runs backwards on every odd pass of the
            // dimensions enclosing it.
            let mut inner_points = self.size();
            for dim in 0..self.shape.len() {
                inner_points /= self.shape[dim];
                let passes = index / (inner_points * self.shape[dim]);
                if dim > 0 && passes % 2 == 1 {
                    coordinate[dim] = self.shape[dim] - 1 - coordinate[dim];
                }
            }
        }

        Some(coordinate)
    }
}
