//! LifecycleManager
//!
//! Sole owner of every open handle of an acquisition: the attached raw
//! sources and the output opened for append.

use container::{ArrayReader, ContainerStore};
use tracing::{info, instrument, warn};

use crate::source::RawSource;

/// Owner of the open raw sources and output handle
pub struct LifecycleManager<S: ContainerStore> {
    sources: Vec<RawSource<S::Reader>>,
    output: Option<S::Writer>,
}

impl<S: ContainerStore> Default for LifecycleManager<S> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            output: None,
        }
    }
}

impl<S: ContainerStore> LifecycleManager<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of the output handle, closing any previous one
    pub fn set_output(&mut self, output: S::Writer) {
        if let Some(mut previous) = self.output.replace(output) {
            warn!(path = %previous.path().display(), "replacing open output handle");
            previous.close();
        }
    }

    /// Take ownership of attached sources
    pub fn set_sources(&mut self, sources: Vec<RawSource<S::Reader>>) {
        self.close_sources();
        self.sources = sources;
    }

    /// Whether raw sources are attached
    pub fn is_attached(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Whether the output is open
    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Attached sources and the output, borrowed together for a tick
    pub fn parts_mut(&mut self) -> (&mut [RawSource<S::Reader>], Option<&mut S::Writer>) {
        (&mut self.sources, self.output.as_mut())
    }

    /// Close every open handle exactly once
    ///
    /// Idempotent. Returns the number of handles closed by this call.
    #[instrument(
        name = "lifecycle_teardown",
        skip(self),
        fields(sources = self.sources.len(), output = self.output.is_some())
    )]
    pub fn teardown(&mut self) -> usize {
        let mut closed = self.close_sources();
        if let Some(mut output) = self.output.take() {
            if close_logged(&mut output) {
                closed += 1;
            }
        }

        observability::record_handles_closed(closed);
        if closed > 0 {
            info!(closed, "teardown completed");
        }
        closed
    }

    fn close_sources(&mut self) -> usize {
        let mut closed = 0;
        for mut source in self.sources.drain(..) {
            if source.is_open() {
                info!(module = source.module(), path = %source.path().display(), "closing file");
                if source.close() {
                    closed += 1;
                }
            }
        }
        closed
    }
}

fn close_logged<R: ArrayReader>(handle: &mut R) -> bool {
    if !handle.is_open() {
        return false;
    }
    info!(path = %handle.path().display(), "closing file");
    handle.close()
}
