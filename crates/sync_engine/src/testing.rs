//! Shared fixtures for unit tests

use std::path::PathBuf;

use container::{ContainerStore, MemoryStore, ModuleWriter};
use contracts::{
    AcquisitionBlueprint, ConfigVersion, DetectorConfig, ElementType, GridScan, OutputConfig,
    SyncConfig,
};

use crate::source::RawSource;

pub fn blueprint(modules: usize, scan: GridScan) -> AcquisitionBlueprint {
    AcquisitionBlueprint {
        version: ConfigVersion::V1,
        detector: DetectorConfig {
            name: "EXCALIBUR".into(),
            modules,
            raw_template: "FEM{}".into(),
            data_type: ElementType::Uint16,
            record_shape: vec![256, 2048],
            attribute_shape: vec![1, 1],
        },
        output: OutputConfig {
            directory: PathBuf::from("/data"),
            file_template: "{}.h5".into(),
            fill_value: 0,
            overwrite: false,
        },
        scan,
        sync: SyncConfig::default(),
    }
}

/// One module writer per raw file and a source attached to each
pub fn attached_modules(
    store: &MemoryStore,
    bp: &AcquisitionBlueprint,
) -> (
    Vec<ModuleWriter<MemoryStore>>,
    Vec<RawSource<<MemoryStore as ContainerStore>::Reader>>,
) {
    let rank = bp.scan.shape.len();
    let writers: Vec<_> = bp
        .raw_paths()
        .iter()
        .map(|path| ModuleWriter::create(store, path, rank, &bp.detector.attribute_shape).unwrap())
        .collect();
    let sources = bp
        .raw_paths()
        .iter()
        .enumerate()
        .map(|(n, path)| RawSource::new(n + 1, store.open_read(path).unwrap()))
        .collect();
    (writers, sources)
}
