//! # Contracts
//!
//! Frozen interface contracts shared by the stitching crates.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Progress Model
//! - Every detector module appends one unique id per completed scan point
//! - `current_idx` is the minimum id confirmed across all modules
//! - Scan points are addressed through `ScanGeometry::coordinate`

mod blueprint;
mod dataset;
mod error;
mod geometry;
pub mod layout;
mod sync;

pub use blueprint::*;
pub use dataset::*;
pub use error::*;
pub use geometry::*;
pub use sync::*;
