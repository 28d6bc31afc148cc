//! DatasetSyncEngine
//!
//! Exposes the acquisition lifecycle hooks and drives attachment and the
//! synchronization loop between them.

use std::sync::Arc;

use container::{ArrayReader, ContainerStore};
use contracts::{
    layout, AcquisitionBlueprint, ContractError, Cursor, DatasetDescriptor, ScanGeometry,
    TickOutcome,
};
use observability::ProgressAggregator;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::attach::{Attachment, SourceAttachment};
use crate::error::{Result, SyncError};
use crate::lifecycle::LifecycleManager;
use crate::skeleton::OutputSkeletonBuilder;
use crate::sync_loop::SynchronizationLoop;

/// How a `run()`/`resume()` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Cursor reached the target, handles stay open until `post_run_ready`
    Completed,
    /// Cancelled while attaching or between ticks, handles released
    Cancelled,
    /// The output has no id array to synchronize into
    NotReady,
}

/// Stitches the raw files of one acquisition into its output
pub struct DatasetSyncEngine<S: ContainerStore> {
    store: S,
    blueprint: AcquisitionBlueprint,
    geometry: Option<Arc<dyn ScanGeometry>>,
    cursor: Cursor,
    handles: LifecycleManager<S>,
    token: CancellationToken,
    progress: ProgressAggregator,
    /// Set by `reset` so the next `configure` replaces the existing output
    rebuild_output: bool,
}

impl<S: ContainerStore> DatasetSyncEngine<S> {
    pub fn new(store: S, blueprint: AcquisitionBlueprint) -> Self {
        Self {
            store,
            blueprint,
            geometry: None,
            cursor: Cursor::default(),
            handles: LifecycleManager::new(),
            token: CancellationToken::new(),
            progress: ProgressAggregator::new(),
            rebuild_output: false,
        }
    }

    /// Current progress cursor
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Token that interrupts the current or next run
    ///
    /// A cancelled run arms a fresh token, fetch it again before the next run.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tick statistics since the last configure
    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    /// Acquisition configuration
    pub fn blueprint(&self) -> &AcquisitionBlueprint {
        &self.blueprint
    }

    /// Whether raw sources are currently attached
    pub fn is_attached(&self) -> bool {
        self.handles.is_attached()
    }

    /// Build the output skeleton and position the cursor
    #[instrument(name = "engine_configure", skip(self, geometry))]
    pub fn configure(
        &mut self,
        geometry: Arc<dyn ScanGeometry>,
        completed_steps: u64,
        steps_to_do: u64,
    ) -> Result<Vec<DatasetDescriptor>> {
        self.handles.teardown();
        self.geometry = None;

        let cursor = checked_cursor(geometry.as_ref(), completed_steps, steps_to_do)?;
        let builder = OutputSkeletonBuilder::new(&self.blueprint);
        let descriptors = if self.rebuild_output {
            builder.rebuild(&self.store, geometry.as_ref())?
        } else {
            builder.build(&self.store, geometry.as_ref())?
        };
        self.rebuild_output = false;
        let output = self.store.open_append(&self.blueprint.output_path())?;
        self.handles.set_output(output);

        self.cursor = cursor;
        self.geometry = Some(geometry);
        self.progress.reset();
        observability::record_target(&self.cursor);
        info!(
            output = %self.blueprint.output_path().display(),
            datasets = descriptors.len(),
            target_idx = self.cursor.target_idx,
            "engine configured"
        );
        Ok(descriptors)
    }

    /// Reposition the cursor without rebuilding the skeleton
    #[instrument(name = "engine_seek", skip(self))]
    pub fn seek(&mut self, completed_steps: u64, steps_to_do: u64) -> Result<()> {
        let geometry = self.geometry.as_ref().ok_or(SyncError::NotConfigured)?;
        self.cursor = checked_cursor(geometry.as_ref(), completed_steps, steps_to_do)?;
        observability::record_target(&self.cursor);
        info!(
            current_idx = self.cursor.current_idx,
            target_idx = self.cursor.target_idx,
            "cursor repositioned"
        );
        Ok(())
    }

    /// Re-arm after a completed run, same as `seek`
    pub fn post_run_armed(&mut self, completed_steps: u64, steps_to_do: u64) -> Result<()> {
        self.seek(completed_steps, steps_to_do)
    }

    /// Attach if needed, then synchronize until the target or cancellation
    ///
    /// Storage failures tear everything down before being returned.
    #[instrument(
        name = "engine_run",
        skip(self),
        fields(current_idx = self.cursor.current_idx, target_idx = self.cursor.target_idx)
    )]
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let geometry = self.geometry.clone().ok_or(SyncError::NotConfigured)?;
        if self.token.is_cancelled() {
            return Ok(self.cancelled());
        }

        if !self.handles.has_output() {
            match self.store.open_append(&self.blueprint.output_path()) {
                Ok(output) => self.handles.set_output(output),
                Err(e) => return Err(self.fail(e.into())),
            }
        }

        if !self.handles.is_attached() {
            let attachment = SourceAttachment::new(&self.store, &self.blueprint.sync, &self.token)
                .attach(&self.blueprint.raw_paths())
                .await;
            match attachment {
                Ok(Attachment::Attached(sources)) => self.handles.set_sources(sources),
                Ok(Attachment::Cancelled) => return Ok(self.cancelled()),
                Err(e) => return Err(self.fail(e)),
            }
        }

        match self.output_has_ids() {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    path = %self.blueprint.output_path().display(),
                    "output has no id array, nothing to synchronize"
                );
                return Ok(RunOutcome::NotReady);
            }
            Err(e) => return Err(self.fail(e.into())),
        }

        let poll_interval = self.blueprint.sync.poll_interval();
        loop {
            let outcome = match self.tick(geometry.as_ref()) {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.fail(e.into())),
            };
            observability::record_tick(&outcome, &self.cursor);
            self.progress.update(&outcome, &self.cursor);

            if self.cursor.is_complete() {
                info!(current_idx = self.cursor.current_idx, "target reached");
                return Ok(RunOutcome::Completed);
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(self.cancelled()),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// Continue a paused run, same as `run`
    pub async fn resume(&mut self) -> Result<RunOutcome> {
        self.run().await
    }

    /// Stop and release every handle
    #[instrument(name = "engine_abort", skip(self))]
    pub fn abort(&mut self) {
        self.token.cancel();
        self.handles.teardown();
        self.token = CancellationToken::new();
    }

    /// Release every handle and forget the configuration
    ///
    /// The next `configure` rebuilds the output skeleton in place.
    #[instrument(name = "engine_reset", skip(self))]
    pub fn reset(&mut self) {
        self.handles.teardown();
        self.geometry = None;
        self.cursor = Cursor::default();
        self.progress.reset();
        self.rebuild_output = true;
    }

    /// Release every handle after a completed run
    #[instrument(name = "engine_post_run_ready", skip(self))]
    pub fn post_run_ready(&mut self) {
        self.handles.teardown();
    }

    fn tick(&mut self, geometry: &dyn ScanGeometry) -> std::result::Result<TickOutcome, ContractError> {
        let tolerance = self.blueprint.sync.missed_tolerance;
        let (sources, output) = self.handles.parts_mut();
        let output = output.ok_or_else(|| {
            ContractError::handle_closed(self.blueprint.output_path().display().to_string())
        })?;
        SynchronizationLoop::new(geometry, tolerance).tick(sources, output, &mut self.cursor)
    }

    fn output_has_ids(&self) -> std::result::Result<bool, ContractError> {
        let mut reader = self.store.open_read(&self.blueprint.output_path())?;
        let found = reader.contains(layout::UNIQUE_ID_PATH);
        reader.close();
        found
    }

    fn cancelled(&mut self) -> RunOutcome {
        self.handles.teardown();
        self.token = CancellationToken::new();
        info!(current_idx = self.cursor.current_idx, "run cancelled");
        RunOutcome::Cancelled
    }

    fn fail(&mut self, e: SyncError) -> SyncError {
        error!(error = %e, current_idx = self.cursor.current_idx, "run failed, releasing handles");
        self.handles.teardown();
        e
    }
}

fn checked_cursor(
    geometry: &dyn ScanGeometry,
    completed_steps: u64,
    steps_to_do: u64,
) -> Result<Cursor> {
    let cursor = Cursor::new(completed_steps, steps_to_do);
    if cursor.target_idx > geometry.size() as u64 {
        return Err(SyncError::InvalidTarget {
            target: cursor.target_idx,
            size: geometry.size(),
        });
    }
    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::blueprint;
    use container::{ContainerWriter, FailurePlan, MemoryStore, ModuleWriter};
    use contracts::GridScan;
    use std::time::Duration;

    fn engine(modules: usize, points: usize) -> (MemoryStore, DatasetSyncEngine<MemoryStore>) {
        let store = MemoryStore::new();
        let bp = blueprint(modules, GridScan::line("x", points));
        (store.clone(), DatasetSyncEngine::new(store, bp))
    }

    fn geometry(engine: &DatasetSyncEngine<MemoryStore>) -> Arc<dyn ScanGeometry> {
        Arc::new(engine.blueprint().scan.clone())
    }

    /// Write `points` scan points on every module, one per `interval`
    fn spawn_modules(
        store: &MemoryStore,
        bp: &AcquisitionBlueprint,
        points: usize,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = store.clone();
        let paths = bp.raw_paths();
        tokio::spawn(async move {
            let mut modules: Vec<_> = paths
                .iter()
                .map(|p| ModuleWriter::create(&store, p, 1, &[1, 1]).unwrap())
                .collect();
            for i in 0..points {
                tokio::time::sleep(interval).await;
                for (n, module) in modules.iter_mut().enumerate() {
                    module.write_point(&[i], i as i64 + 1, (n + 1) as f64).unwrap();
                }
            }
            for module in &mut modules {
                module.close();
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_to_completion() {
        let (store, mut engine) = engine(2, 4);
        let descriptors = engine.configure(geometry(&engine), 0, 4).unwrap();
        assert_eq!(descriptors.len(), 3);

        let producer = spawn_modules(&store, engine.blueprint(), 4, Duration::from_millis(400));
        assert_eq!(engine.run().await.unwrap(), RunOutcome::Completed);
        producer.await.unwrap();

        assert_eq!(engine.cursor().current_idx, 4);
        assert!(engine.progress().not_ready_ticks > 0);
        assert_eq!(engine.progress().points_confirmed, 4);

        let doc = store.published(&engine.blueprint().output_path()).unwrap();
        assert_eq!(doc.read(layout::UNIQUE_ID_PATH, &[3]).unwrap().as_i64(), Some(4));
        assert_eq!(doc.read(layout::SUM_PATH, &[3]).unwrap().as_f64(), 3.0);

        // Handles are held until post-run
        assert!(engine.is_attached());
        engine.post_run_ready();
        assert_eq!(store.open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_requires_configure() {
        let (_store, mut engine) = engine(1, 2);
        assert!(matches!(engine.run().await, Err(SyncError::NotConfigured)));
        assert!(matches!(engine.seek(0, 1), Err(SyncError::NotConfigured)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_attaching() {
        let (store, mut engine) = engine(2, 3);
        engine.configure(geometry(&engine), 0, 3).unwrap();

        let token = engine.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            token.cancel();
        });

        assert_eq!(engine.run().await.unwrap(), RunOutcome::Cancelled);
        assert_eq!(store.open_handles(), 0);
        assert!(!engine.cancel_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_ticks_then_resume() {
        let (store, mut engine) = engine(1, 3);
        engine.configure(geometry(&engine), 0, 3).unwrap();
        let path = engine.blueprint().raw_paths()[0].clone();
        let mut module = ModuleWriter::create(&store, &path, 1, &[1, 1]).unwrap();
        module.write_point(&[0], 1, 1.0).unwrap();

        let token = engine.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            token.cancel();
        });
        assert_eq!(engine.run().await.unwrap(), RunOutcome::Cancelled);
        assert_eq!(engine.cursor().current_idx, 1);
        assert!(!engine.is_attached());

        module.write_point(&[1], 2, 1.0).unwrap();
        module.write_point(&[2], 3, 1.0).unwrap();
        assert_eq!(engine.resume().await.unwrap(), RunOutcome::Completed);
        assert_eq!(engine.cursor().current_idx, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_tears_down_and_propagates() {
        let (store, mut engine) = engine(1, 2);
        engine.configure(geometry(&engine), 0, 2).unwrap();
        let path = engine.blueprint().raw_paths()[0].clone();
        let mut module = ModuleWriter::create(&store, &path, 1, &[1, 1]).unwrap();
        module.write_point(&[0], 1, 1.0).unwrap();
        module.write_point(&[1], 2, 1.0).unwrap();
        module.close();

        // The output starts one point long, so confirming needs a resize
        store.set_failures(FailurePlan {
            fail_resize: [layout::SUM_PATH.to_string()].into_iter().collect(),
            ..Default::default()
        });
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, SyncError::Contract(ContractError::Storage { .. })));
        assert_eq!(store.open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_without_ids_is_not_ready() {
        let (store, mut engine) = engine(1, 2);
        engine.configure(geometry(&engine), 0, 2).unwrap();
        let mut module =
            ModuleWriter::create(&store, &engine.blueprint().raw_paths()[0], 1, &[1, 1]).unwrap();
        let mut replaced = store.create(&engine.blueprint().output_path(), true).unwrap();
        replaced.flush().unwrap();
        replaced.close();

        assert_eq!(engine.run().await.unwrap(), RunOutcome::NotReady);
        module.close();
        engine.abort();
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn test_seek_keeps_skeleton() {
        let (store, mut engine) = engine(1, 10);
        engine.configure(geometry(&engine), 0, 4).unwrap();
        engine.seek(6, 4).unwrap();
        assert_eq!(engine.cursor(), Cursor::new(6, 4));
        assert_eq!(store.file_count(), 1);

        assert!(matches!(
            engine.post_run_armed(8, 4),
            Err(SyncError::InvalidTarget { target: 12, size: 10 })
        ));
    }

    #[test]
    fn test_reconfigure_existing_output() {
        let (store, mut engine) = engine(1, 3);
        engine.configure(geometry(&engine), 0, 3).unwrap();

        let err = engine.configure(geometry(&engine), 0, 3).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Contract(ContractError::AlreadyInitialized { .. })
        ));
        assert_eq!(store.open_handles(), 0);

        engine.reset();
        assert_eq!(engine.cursor(), Cursor::default());
        assert!(matches!(engine.seek(0, 1), Err(SyncError::NotConfigured)));

        // After a reset the skeleton is rebuilt over the old output
        let descriptors = engine.configure(geometry(&engine), 1, 2).unwrap();
        assert!(!descriptors.is_empty());
        assert_eq!(engine.cursor(), Cursor::new(1, 2));
        assert_eq!(store.open_handles(), 1);

        // Rebuilding is a one-shot grant
        let err = engine.configure(geometry(&engine), 0, 3).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Contract(ContractError::AlreadyInitialized { .. })
        ));
    }
}
