//! Container storage for raw module files and the stitched output
//!
//! Groups, external links and growable N-dimensional arrays behind the
//! [`ContainerStore`] seam, with a filesystem backend for real acquisitions
//! and an in-memory backend with failure injection for tests.

pub mod array;
pub mod document;
pub mod fs;
pub mod handles;
pub mod memory;
pub mod module_writer;
pub mod store;

pub use array::{ArrayError, DatasetLayout, NdArray, Scalar};
pub use document::{ContainerDocument, ExternalLink, VirtualDataset, VirtualSource};
pub use fs::{FsReader, FsStore, FsWriter};
pub use handles::{HandleCounter, HandleToken};
pub use memory::{FailurePlan, MemoryReader, MemoryStore, MemoryWriter};
pub use module_writer::{simulate, simulated_sum, ModuleWriter};
pub use store::{ArrayReader, ContainerStore, ContainerWriter, Result};
