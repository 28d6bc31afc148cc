//! OutputSkeletonBuilder
//!
//! Creates the stitched container before acquisition starts: the required
//! groups, links into the first module's metadata, the virtual payload
//! assembled from every module, and the two engine-owned arrays.

use container::{
    ArrayReader, ContainerStore, ContainerWriter, DatasetLayout, ExternalLink, Scalar,
    VirtualDataset, VirtualSource,
};
use contracts::{
    layout, AcquisitionBlueprint, ContractError, DatasetDescriptor, DatasetType, ScanGeometry,
};
use tracing::{info, instrument};

/// Builds the stitched container of one acquisition
pub struct OutputSkeletonBuilder<'a> {
    blueprint: &'a AcquisitionBlueprint,
}

impl<'a> OutputSkeletonBuilder<'a> {
    pub fn new(blueprint: &'a AcquisitionBlueprint) -> Self {
        Self { blueprint }
    }

    /// Paths linked into the first module's raw file
    pub fn node_tree(&self, geometry: &dyn ScanGeometry) -> Vec<String> {
        let mut nodes: Vec<String> = layout::DEFAULT_LINKS.iter().map(|s| s.to_string()).collect();
        for axis in geometry.axes() {
            for base in layout::SETPOINT_BASES {
                nodes.push(layout::setpoint_path(base, axis));
                nodes.push(layout::setpoint_indices_path(base, axis));
            }
        }
        nodes
    }

    /// Layout of the id and sum arrays
    ///
    /// One element per scan dimension up front, growing to the scan shape.
    pub fn engine_layout(&self, geometry: &dyn ScanGeometry, fill: Scalar) -> DatasetLayout {
        let attributes = &self.blueprint.detector.attribute_shape;
        let shape = std::iter::repeat(1)
            .take(geometry.rank())
            .chain(attributes.iter().copied())
            .collect();
        let max_shape = geometry
            .shape()
            .iter()
            .chain(attributes)
            .copied()
            .collect();
        DatasetLayout::bounded(shape, max_shape, fill)
    }

    /// Primary payload mapped from every module, stripes stacked on the first
    /// record dimension
    pub fn payload(&self, geometry: &dyn ScanGeometry) -> VirtualDataset {
        let detector = &self.blueprint.detector;
        let stripe = detector.record_shape.first().copied().unwrap_or(0);

        let mut shape = geometry.shape().to_vec();
        shape.extend(detector.record_shape.iter().enumerate().map(|(dim, &len)| {
            if dim == 0 {
                len * detector.modules
            } else {
                len
            }
        }));

        let sources = (1..=detector.modules)
            .map(|module| {
                let mut offset = vec![0; shape.len()];
                if let Some(first) = offset.get_mut(geometry.rank()) {
                    *first = (module - 1) * stripe;
                }
                VirtualSource {
                    link: ExternalLink {
                        file: self.blueprint.raw_filename(module),
                        path: layout::DATA_PATH.to_string(),
                    },
                    offset,
                    shape: geometry
                        .shape()
                        .iter()
                        .chain(&detector.record_shape)
                        .copied()
                        .collect(),
                }
            })
            .collect();

        VirtualDataset {
            shape,
            data_type: detector.data_type,
            fill_value: self.blueprint.output.fill_value,
            sources,
        }
    }

    /// Catalog entries for the produced and referenced datasets
    pub fn descriptors(&self, geometry: &dyn ScanGeometry) -> Vec<DatasetDescriptor> {
        let filename = self.blueprint.output_filename();
        let name = &self.blueprint.detector.name;
        let rank = self.blueprint.detector.record_shape.len() + geometry.rank();

        let mut descriptors = vec![
            DatasetDescriptor {
                name: format!("{name}.data"),
                filename: filename.clone(),
                dataset_type: DatasetType::Primary,
                rank,
                path: layout::DATA_PATH.to_string(),
                uniqueid: layout::UNIQUE_ID_PATH.to_string(),
            },
            DatasetDescriptor {
                name: format!("{name}.sum"),
                filename: filename.clone(),
                dataset_type: DatasetType::Secondary,
                rank,
                path: layout::SUM_PATH.to_string(),
                uniqueid: layout::UNIQUE_ID_PATH.to_string(),
            },
        ];
        descriptors.extend(geometry.axes().iter().map(|axis| DatasetDescriptor {
            name: format!("{axis}.value_set"),
            filename: filename.clone(),
            dataset_type: DatasetType::PositionSet,
            rank: 1,
            path: layout::setpoint_path(layout::DETECTOR_GROUP, axis),
            uniqueid: String::new(),
        }));
        descriptors
    }

    /// Create the container and return its descriptors
    ///
    /// Fails with `AlreadyInitialized` when the output exists and overwriting
    /// is not enabled.
    #[instrument(
        name = "skeleton_build",
        skip(self, store, geometry),
        fields(
            path = %self.blueprint.output_path().display(),
            modules = self.blueprint.detector.modules,
            rank = geometry.rank()
        )
    )]
    pub fn build<S: ContainerStore>(
        &self,
        store: &S,
        geometry: &dyn ScanGeometry,
    ) -> Result<Vec<DatasetDescriptor>, ContractError> {
        self.create(store, geometry, self.blueprint.output.overwrite)
    }

    /// Replace whatever output exists with a fresh skeleton
    pub fn rebuild<S: ContainerStore>(
        &self,
        store: &S,
        geometry: &dyn ScanGeometry,
    ) -> Result<Vec<DatasetDescriptor>, ContractError> {
        self.create(store, geometry, true)
    }

    fn create<S: ContainerStore>(
        &self,
        store: &S,
        geometry: &dyn ScanGeometry,
        overwrite: bool,
    ) -> Result<Vec<DatasetDescriptor>, ContractError> {
        let path = self.blueprint.output_path();
        let mut writer = store.create(&path, overwrite)?;
        let result = self.populate(&mut writer, geometry);
        writer.close();
        result?;

        info!(links = self.node_tree(geometry).len(), "output skeleton created");
        Ok(self.descriptors(geometry))
    }

    fn populate<W: ContainerWriter>(
        &self,
        writer: &mut W,
        geometry: &dyn ScanGeometry,
    ) -> Result<(), ContractError> {
        for group in layout::REQUIRED_GROUPS {
            writer.require_group(group)?;
        }

        let raw_file = self.blueprint.raw_filename(1);
        for node in self.node_tree(geometry) {
            writer.link_external(&node, &raw_file, &node)?;
        }

        writer.create_virtual(layout::DATA_PATH, self.payload(geometry))?;
        writer.create_dataset(
            layout::UNIQUE_ID_PATH,
            self.engine_layout(geometry, Scalar::Int(0)),
        )?;
        writer.create_dataset(
            layout::SUM_PATH,
            self.engine_layout(geometry, Scalar::Float(f64::NAN)),
        )?;
        writer.flush()
    }
}
