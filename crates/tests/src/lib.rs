//! # Integration Tests
//!
//! Cross-crate scenario and end-to-end tests.
//!
//! Covers:
//! - acquisition scenarios driven tick by tick against the in-memory store
//! - engine runs against simulated modules, in memory and on disk
//! - handle release and failure propagation

#[cfg(test)]
mod fixtures {
    use std::path::Path;

    use config_loader::{ConfigFormat, ConfigLoader};
    use container::{ContainerStore, MemoryStore, ModuleWriter};
    use contracts::{layout, AcquisitionBlueprint};
    use sync_engine::{OutputSkeletonBuilder, RawSource};

    /// Line scan over `points` with `modules` detector modules
    pub fn blueprint(directory: &Path, modules: usize, points: usize) -> AcquisitionBlueprint {
        let toml = format!(
            r#"
            [detector]
            modules = {modules}
            record_shape = [256, 2048]

            [output]
            directory = "{}"

            [scan]
            axes = ["x"]
            shape = [{points}]

            [sync]
            poll_interval_ms = 20
            file_poll_interval_ms = 20
            dataset_poll_interval_ms = 20
            "#,
            directory.display()
        );
        ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap()
    }

    pub type Sources = Vec<RawSource<<MemoryStore as ContainerStore>::Reader>>;

    /// Skeleton, one writer per module and the engine side handles
    pub fn acquisition(
        store: &MemoryStore,
        bp: &AcquisitionBlueprint,
    ) -> (
        Vec<ModuleWriter<MemoryStore>>,
        Sources,
        <MemoryStore as ContainerStore>::Writer,
    ) {
        OutputSkeletonBuilder::new(bp).build(store, &bp.scan).unwrap();
        let writers = bp
            .raw_paths()
            .iter()
            .map(|path| ModuleWriter::create(store, path, 1, &bp.detector.attribute_shape).unwrap())
            .collect();
        let sources = bp
            .raw_paths()
            .iter()
            .enumerate()
            .map(|(n, path)| RawSource::new(n + 1, store.open_read(path).unwrap()))
            .collect();
        let output = store.open_append(&bp.output_path()).unwrap();
        (writers, sources, output)
    }

    /// Confirmed ids and sums as published in the output
    pub fn confirmed(store: &MemoryStore, bp: &AcquisitionBlueprint) -> (Vec<i64>, Vec<f64>) {
        let doc = store.published(&bp.output_path()).unwrap();
        let len = doc.dataset(layout::UNIQUE_ID_PATH).unwrap().shape()[0];
        (0..len)
            .map(|i| {
                (
                    doc.read(layout::UNIQUE_ID_PATH, &[i, 0, 0])
                        .unwrap()
                        .as_i64()
                        .unwrap(),
                    doc.read(layout::SUM_PATH, &[i, 0, 0]).unwrap().as_f64(),
                )
            })
            .unzip()
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::path::Path;

    use container::{ContainerStore, FailurePlan, MemoryStore};
    use contracts::{layout, ContractError, Cursor, TickOutcome};
    use sync_engine::SynchronizationLoop;

    use crate::fixtures::{acquisition, blueprint, confirmed};

    /// Steady state: both modules complete every point
    #[test]
    fn test_steady_state() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 2, 3);
        let (mut modules, mut sources, mut output) = acquisition(&store, &bp);

        for i in 0..3 {
            modules[0].write_point(&[i], i as i64 + 1, 10.0 * (i + 1) as f64).unwrap();
            modules[1].write_point(&[i], i as i64 + 1, (i + 1) as f64).unwrap();
        }

        let sync = SynchronizationLoop::new(&bp.scan, bp.sync.missed_tolerance);
        let mut cursor = Cursor::new(0, 3);
        assert_eq!(
            sync.tick(&mut sources, &mut output, &mut cursor).unwrap(),
            TickOutcome::Advanced { from: 0, to: 3 }
        );
        assert_eq!(cursor.current_idx, 3);
        assert_eq!(
            sync.tick(&mut sources, &mut output, &mut cursor).unwrap(),
            TickOutcome::Complete
        );

        let (ids, sums) = confirmed(&store, &bp);
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(sums, vec![11.0, 22.0, 33.0]);
    }

    /// Range stall: one module has not grown its id array to the next point
    #[test]
    fn test_range_stall_retries_next_tick() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 2, 3);
        let (mut modules, mut sources, mut output) = acquisition(&store, &bp);

        for i in 0..3 {
            modules[0].write_point(&[i], i as i64 + 1, 10.0).unwrap();
        }
        for i in 0..2 {
            modules[1].write_point(&[i], i as i64 + 1, 1.0).unwrap();
        }

        let sync = SynchronizationLoop::new(&bp.scan, bp.sync.missed_tolerance);
        let mut cursor = Cursor::new(0, 3);
        assert_eq!(
            sync.tick(&mut sources, &mut output, &mut cursor).unwrap(),
            TickOutcome::NotReady { from: 0, to: 2, index: 2 }
        );
        assert_eq!(cursor.current_idx, 2);
        assert_eq!(confirmed(&store, &bp).0, vec![1, 2]);

        modules[1].write_point(&[2], 3, 1.0).unwrap();
        assert_eq!(
            sync.tick(&mut sources, &mut output, &mut cursor).unwrap(),
            TickOutcome::Advanced { from: 2, to: 3 }
        );
        assert_eq!(confirmed(&store, &bp), (vec![1, 2, 3], vec![11.0, 11.0, 11.0]));
    }

    /// Value stall: a stale id costs one miss per tick and never accumulates
    #[test]
    fn test_value_stall_recovers() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 2, 4);
        let (mut modules, mut sources, mut output) = acquisition(&store, &bp);

        for i in 0..4 {
            modules[0].write_point(&[i], i as i64 + 1, 1.0).unwrap();
        }
        for (i, id) in [1, 2, 2].into_iter().enumerate() {
            modules[1].write_point(&[i], id, 1.0).unwrap();
        }

        let sync = SynchronizationLoop::new(&bp.scan, bp.sync.missed_tolerance);
        let mut cursor = Cursor::new(0, 4);
        let mut outcomes = Vec::new();
        for _ in 0..(bp.sync.missed_tolerance + 5) {
            outcomes.push(sync.tick(&mut sources, &mut output, &mut cursor).unwrap());
            assert_eq!(cursor.missed_count, 1);
        }

        assert_eq!(outcomes[0], TickOutcome::NotReady { from: 0, to: 2, index: 3 });
        assert!(outcomes[1..]
            .iter()
            .all(|o| *o == TickOutcome::NotReady { from: 2, to: 2, index: 3 }));
        assert_eq!(cursor.current_idx, 2);

        modules[1].write_point(&[2], 3, 1.0).unwrap();
        modules[1].write_point(&[3], 4, 1.0).unwrap();
        assert_eq!(
            sync.tick(&mut sources, &mut output, &mut cursor).unwrap(),
            TickOutcome::Advanced { from: 2, to: 4 }
        );
        assert_eq!(cursor.missed_count, 0);
        assert_eq!(confirmed(&store, &bp).0, vec![1, 2, 3, 4]);
    }

    /// A point overtaken by a later confirmation keeps its fill values
    #[test]
    fn test_overtaken_point_keeps_fill() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 2, 4);
        let (mut modules, mut sources, mut output) = acquisition(&store, &bp);
        let sync = SynchronizationLoop::new(&bp.scan, bp.sync.missed_tolerance);
        let mut cursor = Cursor::new(0, 4);

        let mut outcomes = Vec::new();
        let mut published = Vec::new();
        for (i, (a, b)) in [(1, 1), (2, 2), (3, 2), (4, 4)].into_iter().enumerate() {
            modules[0].write_point(&[i], a, 1.0).unwrap();
            modules[1].write_point(&[i], b, 1.0).unwrap();
            outcomes.push(sync.tick(&mut sources, &mut output, &mut cursor).unwrap());
            published.push(confirmed(&store, &bp).0);
        }

        assert_eq!(
            outcomes,
            vec![
                TickOutcome::NotReady { from: 0, to: 1, index: 1 },
                TickOutcome::NotReady { from: 1, to: 2, index: 2 },
                TickOutcome::NotReady { from: 2, to: 2, index: 3 },
                TickOutcome::Advanced { from: 2, to: 4 },
            ]
        );
        assert_eq!(
            published,
            vec![vec![1], vec![1, 2], vec![1, 2], vec![1, 2, 0, 4]]
        );

        let (ids, sums) = confirmed(&store, &bp);
        assert_eq!(ids, vec![1, 2, 0, 4]);
        assert_eq!(sums[..2], [2.0, 2.0]);
        assert!(sums[2].is_nan());
        assert_eq!(sums[3], 2.0);
    }

    /// Confirmed ids never decrease while modules report points out of order
    #[test]
    fn test_progress_is_monotonic() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 3, 6);
        let (mut modules, mut sources, mut output) = acquisition(&store, &bp);
        let sync = SynchronizationLoop::new(&bp.scan, bp.sync.missed_tolerance);
        let mut cursor = Cursor::new(0, 6);

        let mut previous = 0;
        for i in 0..6 {
            // Modules report each point in a different order
            for k in 0..3 {
                let n = (i + k) % 3;
                modules[n].write_point(&[i], i as i64 + 1, 1.0).unwrap();
                sync.tick(&mut sources, &mut output, &mut cursor).unwrap();
                assert!(cursor.current_idx >= previous);
                previous = cursor.current_idx;
                let expected = if k == 2 { i + 1 } else { i };
                assert_eq!(cursor.current_idx, expected as u64);
            }
        }

        let (ids, sums) = confirmed(&store, &bp);
        assert_eq!(ids, (1..=6).collect::<Vec<_>>());
        assert!(sums.iter().all(|&s| s == 3.0));
    }

    /// A failed write surfaces as a storage error without moving the cursor
    #[test]
    fn test_write_failure_propagates() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 2, 2);
        let (mut modules, mut sources, mut output) = acquisition(&store, &bp);
        for module in &mut modules {
            module.write_point(&[0], 1, 1.0).unwrap();
        }

        store.set_failures(FailurePlan {
            fail_write: [layout::UNIQUE_ID_PATH.to_string()].into_iter().collect(),
            ..Default::default()
        });
        let sync = SynchronizationLoop::new(&bp.scan, bp.sync.missed_tolerance);
        let mut cursor = Cursor::new(0, 2);
        let err = sync.tick(&mut sources, &mut output, &mut cursor).unwrap_err();

        assert!(matches!(err, ContractError::Storage { .. }));
        assert_eq!(cursor.current_idx, 0);
        assert_eq!(confirmed(&store, &bp).0, vec![0]);
        assert!(store.exists(&bp.output_path()));
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use std::path::Path;
    use std::time::Duration;

    use container::{ContainerStore, MemoryStore};
    use contracts::ContractError;
    use sync_engine::{
        Attachment, DatasetSyncEngine, LifecycleManager, RunOutcome, SourceAttachment, SyncError,
    };
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::fixtures::{acquisition, blueprint};

    /// Cancellation while a module file never appears
    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_attachment() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 2, 3);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(55)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let attachment = SourceAttachment::new(&store, &bp.sync, &token)
            .attach(&bp.raw_paths())
            .await
            .unwrap();

        assert!(matches!(attachment, Attachment::Cancelled));
        assert!(started.elapsed() < Duration::from_millis(55) + bp.sync.file_poll_interval());
        assert_eq!(store.open_handles(), 0);
    }

    /// The engine reports cancellation and leaves nothing open
    #[tokio::test(start_paused = true)]
    async fn test_engine_cancel_mid_attachment() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 2, 3);
        let scan = bp.scan.clone();
        let mut engine = DatasetSyncEngine::new(store.clone(), bp);
        engine.configure(std::sync::Arc::new(scan), 0, 3).unwrap();

        let token = engine.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        assert_eq!(engine.run().await.unwrap(), RunOutcome::Cancelled);
        assert!(!engine.is_attached());
        assert_eq!(store.open_handles(), 0);
    }

    /// Teardown closes each handle once
    #[test]
    fn test_teardown_is_idempotent() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 2, 3);
        let (mut modules, sources, output) = acquisition(&store, &bp);
        for module in &mut modules {
            module.close();
        }

        let mut lifecycle = LifecycleManager::<MemoryStore>::new();
        lifecycle.set_sources(sources);
        lifecycle.set_output(output);
        assert_eq!(store.open_handles(), 3);

        assert_eq!(lifecycle.teardown(), 3);
        assert_eq!(lifecycle.teardown(), 0);
        assert_eq!(store.open_handles(), 0);
    }

    /// A second configure against an existing output is refused
    #[test]
    fn test_existing_output_is_refused() {
        let store = MemoryStore::new();
        let bp = blueprint(Path::new("/data"), 1, 2);
        let scan = std::sync::Arc::new(bp.scan.clone());
        let mut engine = DatasetSyncEngine::new(store.clone(), bp);
        engine.configure(scan.clone(), 0, 2).unwrap();

        let mut other = DatasetSyncEngine::new(store.clone(), engine.blueprint().clone());
        let err = other.configure(scan, 0, 2).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Contract(ContractError::AlreadyInitialized { .. })
        ));
        engine.abort();
        assert_eq!(store.open_handles(), 0);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use container::{simulate, simulated_sum, ArrayReader, ContainerStore, FsStore, MemoryStore};
    use contracts::layout;
    use sync_engine::{DatasetSyncEngine, RunOutcome};
    use tokio_util::sync::CancellationToken;

    use crate::fixtures::blueprint;

    /// Simulated modules -> engine -> published output, in memory
    #[tokio::test(start_paused = true)]
    async fn test_e2e_memory_acquisition() {
        let store = MemoryStore::new();
        let bp = blueprint(std::path::Path::new("/data"), 3, 8);
        let mut engine = DatasetSyncEngine::new(store.clone(), bp.clone());
        engine.configure(Arc::new(bp.scan.clone()), 0, 8).unwrap();

        let producer = tokio::spawn(simulate(
            store.clone(),
            bp.clone(),
            Duration::from_millis(35),
            CancellationToken::new(),
        ));

        assert_eq!(engine.run().await.unwrap(), RunOutcome::Completed);
        assert_eq!(producer.await.unwrap().unwrap(), 8);
        assert_eq!(engine.progress().points_confirmed, 8);

        let doc = store.published(&bp.output_path()).unwrap();
        for i in 0..8 {
            let expected: f64 = (1..=3).map(|m| simulated_sum(m, i)).sum();
            assert_eq!(doc.read(layout::SUM_PATH, &[i, 0, 0]).unwrap().as_f64(), expected);
            assert_eq!(
                doc.read(layout::UNIQUE_ID_PATH, &[i, 0, 0]).unwrap().as_i64(),
                Some(i as i64 + 1)
            );
        }

        engine.post_run_ready();
        assert_eq!(store.open_handles(), 0);
    }

    /// Same pipeline against files on disk
    #[tokio::test]
    async fn test_e2e_filesystem_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new();
        let bp = blueprint(dir.path(), 2, 5);
        let mut engine = DatasetSyncEngine::new(store.clone(), bp.clone());
        let descriptors = engine.configure(Arc::new(bp.scan.clone()), 0, 5).unwrap();
        assert_eq!(descriptors.len(), 3);

        let producer = tokio::spawn(simulate(
            store.clone(),
            bp.clone(),
            Duration::from_millis(5),
            CancellationToken::new(),
        ));

        let outcome = tokio::time::timeout(Duration::from_secs(30), engine.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(producer.await.unwrap().unwrap(), 5);
        assert_eq!(engine.cursor().current_idx, 5);
        engine.post_run_ready();

        let reader = store.open_read(&bp.output_path()).unwrap();
        assert_eq!(reader.shape(layout::UNIQUE_ID_PATH).unwrap()[0], 5);
        assert_eq!(
            reader.read(layout::SUM_PATH, &[4, 0, 0]).unwrap().as_f64(),
            simulated_sum(1, 4) + simulated_sum(2, 4)
        );
    }
}
