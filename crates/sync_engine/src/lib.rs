//! # Sync Engine
//!
//! Stitches the per-module raw files of a detector acquisition into one
//! output container while the modules are still writing.
//!
//! Responsibilities:
//! - Build the output skeleton (`OutputSkeletonBuilder`)
//! - Wait for the raw files to appear (`SourceAttachment`)
//! - Confirm scan points across modules and write the id and sum arrays
//!   (`SynchronizationLoop`)
//! - Release every handle on completion, abort or reset (`LifecycleManager`)
//!
//! ## Example
//!
//! ```ignore
//! use sync_engine::{DatasetSyncEngine, RunOutcome};
//!
//! let mut engine = DatasetSyncEngine::new(FsStore::new(), blueprint);
//! let descriptors = engine.configure(Arc::new(scan), 0, steps)?;
//!
//! match engine.run().await? {
//!     RunOutcome::Completed => engine.post_run_ready(),
//!     RunOutcome::Cancelled | RunOutcome::NotReady => {}
//! }
//! ```

mod attach;
mod engine;
mod error;
mod lifecycle;
mod skeleton;
mod source;
mod sync_loop;

#[cfg(test)]
mod testing;

pub use attach::{Attachment, SourceAttachment};
pub use engine::{DatasetSyncEngine, RunOutcome};
pub use error::{Result, SyncError};
pub use lifecycle::LifecycleManager;
pub use skeleton::OutputSkeletonBuilder;
pub use source::{in_range, RawSource};
pub use sync_loop::SynchronizationLoop;

pub use contracts::{Cursor, TickOutcome};
