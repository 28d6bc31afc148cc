//! SourceAttachment
//!
//! Waits for every module's raw file and id array to become observable, then
//! hands back one read handle per module. Both waits poll and observe the
//! cancellation token between polls; a cancelled attachment releases every
//! handle it opened.

use std::path::{Path, PathBuf};
use std::time::Duration;

use container::ContainerStore;
use contracts::{ContractError, SyncConfig};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{Result, SyncError};
use crate::source::RawSource;

/// Result of an attachment attempt
#[derive(Debug)]
pub enum Attachment<R: container::ArrayReader> {
    /// One handle per module, ordered by module ordinal
    Attached(Vec<RawSource<R>>),
    /// Cancelled while waiting, nothing left open
    Cancelled,
}

/// Binds raw module files once they exist
pub struct SourceAttachment<'a, S: ContainerStore> {
    store: &'a S,
    config: &'a SyncConfig,
    token: &'a CancellationToken,
}

impl<'a, S: ContainerStore> SourceAttachment<'a, S> {
    pub fn new(store: &'a S, config: &'a SyncConfig, token: &'a CancellationToken) -> Self {
        Self {
            store,
            config,
            token,
        }
    }

    /// Wait for and open every raw file in `paths`
    #[instrument(name = "source_attach", skip(self, paths), fields(modules = paths.len()))]
    pub async fn attach(&self, paths: &[PathBuf]) -> Result<Attachment<S::Reader>> {
        let started = Instant::now();
        let mut sources = Vec::with_capacity(paths.len());

        match self.attach_all(paths, started, &mut sources).await {
            Ok(true) => {
                let waited = started.elapsed();
                observability::record_attach_wait_ms(waited.as_secs_f64() * 1000.0);
                info!(waited_ms = waited.as_millis() as u64, "raw files attached");
                Ok(Attachment::Attached(sources))
            }
            Ok(false) => {
                release(&mut sources);
                info!("attachment cancelled");
                Ok(Attachment::Cancelled)
            }
            Err(e) => {
                release(&mut sources);
                Err(e)
            }
        }
    }

    async fn attach_all(
        &self,
        paths: &[PathBuf],
        started: Instant,
        sources: &mut Vec<RawSource<S::Reader>>,
    ) -> Result<bool> {
        for (ordinal, path) in paths.iter().enumerate() {
            info!(path = %path.display(), "waiting for file to be created");
            let interval = self.config.file_poll_interval();
            if !self
                .wait(path, interval, started, || Ok(self.store.exists(path)))
                .await?
            {
                return Ok(false);
            }
            sources.push(RawSource::new(ordinal + 1, self.store.open_read(path)?));
        }

        for source in sources.iter() {
            let path = source.path().to_path_buf();
            info!(path = %path.display(), "waiting for id array");
            let interval = self.config.dataset_poll_interval();
            if !self
                .wait(&path, interval, started, || source.has_id_array())
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Poll `ready` every `interval`
    ///
    /// Returns false when cancelled.
    async fn wait(
        &self,
        path: &Path,
        interval: Duration,
        started: Instant,
        mut ready: impl FnMut() -> std::result::Result<bool, ContractError>,
    ) -> Result<bool> {
        loop {
            if ready()? {
                return Ok(true);
            }
            if let Some(timeout) = self.config.attach_timeout() {
                if started.elapsed() >= timeout {
                    return Err(SyncError::AttachTimeout {
                        path: path.display().to_string(),
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
            debug!(path = %path.display(), "not observable yet");

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(false),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

fn release<R: container::ArrayReader>(sources: &mut Vec<RawSource<R>>) {
    for source in sources.iter_mut() {
        source.close();
    }
    sources.clear();
}
