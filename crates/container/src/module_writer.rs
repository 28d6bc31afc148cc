//! Raw module file producer
//!
//! Writes raw files the way an independent detector module does: a unique id
//! and a partial sum per completed scan point, growing both arrays as the
//! scan advances and flushing after every point. Used by scenario tests and
//! by the `--simulate` mode of the command line tool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use contracts::{layout, AcquisitionBlueprint, ScanGeometry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::array::{DatasetLayout, Scalar};
use crate::store::{ArrayReader, ContainerStore, ContainerWriter, Result};

/// Producer of one raw module file
pub struct ModuleWriter<S: ContainerStore> {
    writer: S::Writer,
    scan_rank: usize,
    attribute_shape: Vec<usize>,
}

impl<S: ContainerStore> ModuleWriter<S> {
    /// Create a raw file holding empty id and sum arrays
    pub fn create(
        store: &S,
        path: &Path,
        scan_rank: usize,
        attribute_shape: &[usize],
    ) -> Result<Self> {
        let mut module = Self::create_without_ids(store, path, scan_rank, attribute_shape)?;
        module.add_ids()?;
        Ok(module)
    }

    /// Create a raw file whose id array is not there yet
    ///
    /// A module that has opened its file but not started writing frames.
    pub fn create_without_ids(
        store: &S,
        path: &Path,
        scan_rank: usize,
        attribute_shape: &[usize],
    ) -> Result<Self> {
        let mut module = Self {
            writer: store.create(path, true)?,
            scan_rank,
            attribute_shape: attribute_shape.to_vec(),
        };
        module.writer.require_group(layout::SUM_GROUP)?;
        module.writer.require_group(layout::ATTRIBUTES_GROUP)?;
        module
            .writer
            .create_dataset(layout::SUM_PATH, module.empty_layout(Scalar::Float(0.0)))?;
        module.writer.flush()?;
        Ok(module)
    }

    /// Create the id array of a file made by `create_without_ids`
    pub fn add_ids(&mut self) -> Result<()> {
        if self.writer.contains(layout::UNIQUE_ID_PATH)? {
            return Ok(());
        }
        let shape = self.writer.shape(layout::SUM_PATH)?;
        let mut ids = self.empty_layout(Scalar::Int(0));
        ids.shape = shape;
        self.writer.create_dataset(layout::UNIQUE_ID_PATH, ids)?;
        self.writer.flush()
    }

    /// Record a completed scan point and publish it
    pub fn write_point(&mut self, coordinate: &[usize], id: i64, sum: f64) -> Result<()> {
        self.stage_point(coordinate, id, sum)?;
        self.writer.flush()
    }

    /// Record a completed scan point without publishing it
    pub fn stage_point(&mut self, coordinate: &[usize], id: i64, sum: f64) -> Result<()> {
        self.grow_to(coordinate)?;
        let index = self.element_index(coordinate);
        self.writer.write(layout::SUM_PATH, &index, Scalar::Float(sum))?;
        self.writer.write(layout::UNIQUE_ID_PATH, &index, Scalar::Int(id))
    }

    /// Publish staged points
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    /// Container location
    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    /// Release the file
    pub fn close(&mut self) -> bool {
        self.writer.close()
    }

    fn empty_layout(&self, fill: Scalar) -> DatasetLayout {
        let shape = std::iter::repeat(0)
            .take(self.scan_rank)
            .chain(self.attribute_shape.iter().copied())
            .collect();
        DatasetLayout::unlimited(shape, fill)
    }

    fn element_index(&self, coordinate: &[usize]) -> Vec<usize> {
        let mut index = coordinate.to_vec();
        index.resize(self.scan_rank + self.attribute_shape.len(), 0);
        index
    }

    fn grow_to(&mut self, coordinate: &[usize]) -> Result<()> {
        for dataset in [layout::SUM_PATH, layout::UNIQUE_ID_PATH] {
            let mut shape = self.writer.shape(dataset)?;
            let mut grown = false;
            for (len, &position) in shape.iter_mut().zip(coordinate) {
                if *len <= position {
                    *len = position + 1;
                    grown = true;
                }
            }
            if grown {
                self.writer.resize(dataset, &shape)?;
            }
        }
        Ok(())
    }
}

/// Partial sum a simulated module reports for a scan point
pub fn simulated_sum(module: usize, index: usize) -> f64 {
    (module * 1000 + index) as f64
}

/// Produce every raw file of an acquisition, one scan point per `interval`
///
/// Module `m` reports id `index + 1` and `simulated_sum(m, index)` for each
/// point. Returns the number of points written before completion or
/// cancellation.
#[instrument(
    name = "simulate_modules",
    skip(store, blueprint, token),
    fields(modules = blueprint.detector.modules, points = blueprint.scan.size())
)]
pub async fn simulate<S: ContainerStore>(
    store: S,
    blueprint: AcquisitionBlueprint,
    interval: Duration,
    token: CancellationToken,
) -> Result<u64> {
    let rank = blueprint.scan.rank();
    let paths: Vec<PathBuf> = blueprint.raw_paths();
    let mut modules = paths
        .iter()
        .map(|path| ModuleWriter::create(&store, path, rank, &blueprint.detector.attribute_shape))
        .collect::<Result<Vec<_>>>()?;

    let mut written = 0u64;
    for index in 0..blueprint.scan.size() {
        let Some(coordinate) = blueprint.scan.coordinate(index) else {
            break;
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(written, "simulation cancelled");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        for (ordinal, module) in modules.iter_mut().enumerate() {
            module.write_point(&coordinate, index as i64 + 1, simulated_sum(ordinal + 1, index))?;
        }
        written += 1;
        debug!(index, ?coordinate, "simulated point written");
    }

    for module in &mut modules {
        module.close();
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use contracts::GridScan;

    #[test]
    fn test_write_point_grows_arrays() {
        let store = MemoryStore::new();
        let path = PathBuf::from("/data/FEM1.h5");
        let mut module = ModuleWriter::create(&store, &path, 2, &[1, 1]).unwrap();

        module.write_point(&[0, 2], 3, 7.5).unwrap();

        let doc = store.published(&path).unwrap();
        assert_eq!(doc.dataset(layout::UNIQUE_ID_PATH).unwrap().shape(), &[1, 3, 1, 1]);
        assert_eq!(doc.read(layout::UNIQUE_ID_PATH, &[0, 2]).unwrap(), Scalar::Int(3));
        assert_eq!(doc.read(layout::UNIQUE_ID_PATH, &[0, 0]).unwrap(), Scalar::Int(0));
        assert_eq!(doc.read(layout::SUM_PATH, &[0, 2]).unwrap(), Scalar::Float(7.5));
    }

    #[test]
    fn test_ids_added_later() {
        let store = MemoryStore::new();
        let path = PathBuf::from("/data/FEM2.h5");
        let mut module = ModuleWriter::create_without_ids(&store, &path, 1, &[1, 1]).unwrap();
        assert!(!store.published(&path).unwrap().contains(layout::UNIQUE_ID_PATH));

        module.add_ids().unwrap();
        assert!(store.published(&path).unwrap().contains(layout::UNIQUE_ID_PATH));
    }

    #[test]
    fn test_staged_point_invisible_until_flush() {
        let store = MemoryStore::new();
        let path = PathBuf::from("/data/FEM1.h5");
        let mut module = ModuleWriter::create(&store, &path, 1, &[1, 1]).unwrap();

        module.stage_point(&[0], 1, 1.0).unwrap();
        let doc = store.published(&path).unwrap();
        assert_eq!(doc.dataset(layout::UNIQUE_ID_PATH).unwrap().shape(), &[0, 1, 1]);

        module.flush().unwrap();
        let doc = store.published(&path).unwrap();
        assert_eq!(doc.read(layout::UNIQUE_ID_PATH, &[0]).unwrap(), Scalar::Int(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_writes_every_point() {
        let store = MemoryStore::new();
        let blueprint: AcquisitionBlueprint = serde_json::from_value(serde_json::json!({
            "detector": { "modules": 2, "record_shape": [4, 8] },
            "output": { "directory": "/data" },
            "scan": GridScan::new(vec!["y".into(), "x".into()], vec![2, 2]),
        }))
        .unwrap();

        let written = simulate(
            store.clone(),
            blueprint,
            Duration::from_millis(10),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(written, 4);
        let doc = store.published(Path::new("/data/FEM2.h5")).unwrap();
        assert_eq!(doc.read(layout::UNIQUE_ID_PATH, &[1, 1]).unwrap(), Scalar::Int(4));
        assert_eq!(
            doc.read(layout::SUM_PATH, &[1, 1]).unwrap(),
            Scalar::Float(simulated_sum(2, 3))
        );
        assert_eq!(store.open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_stops_on_cancel() {
        let store = MemoryStore::new();
        let blueprint: AcquisitionBlueprint = serde_json::from_value(serde_json::json!({
            "detector": { "modules": 1, "record_shape": [4] },
            "output": { "directory": "/data" },
            "scan": GridScan::line("x", 100),
        }))
        .unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let written = simulate(store, blueprint, Duration::from_millis(10), token)
            .await
            .unwrap();
        assert_eq!(written, 0);
    }
}
