//! Configuration validation
//!
//! Rules:
//! - at least one detector module, non-empty output name
//! - templates carry a `{}` placeholder
//! - record and attribute dimensions > 0
//! - scan axes unique and matching the scan shape
//! - poll intervals > 0

use std::collections::HashSet;

use contracts::{AcquisitionBlueprint, ContractError};

/// Validate an AcquisitionBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    validate_detector(blueprint)?;
    validate_templates(blueprint)?;
    validate_scan(blueprint)?;
    validate_sync(blueprint)?;
    Ok(())
}

/// Validate module count and record geometry
fn validate_detector(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    let detector = &blueprint.detector;

    if detector.modules == 0 {
        return Err(ContractError::config_validation(
            "detector.modules",
            "at least one detector module is required",
        ));
    }

    if detector.name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "detector.name",
            "detector name cannot be empty",
        ));
    }

    if detector.record_shape.is_empty() {
        return Err(ContractError::config_validation(
            "detector.record_shape",
            "record_shape cannot be empty",
        ));
    }

    if let Some(dim) = detector.record_shape.iter().position(|&len| len == 0) {
        return Err(ContractError::config_validation(
            format!("detector.record_shape[{dim}]"),
            "record dimensions must be > 0",
        ));
    }

    if let Some(dim) = detector.attribute_shape.iter().position(|&len| len == 0) {
        return Err(ContractError::config_validation(
            format!("detector.attribute_shape[{dim}]"),
            "attribute dimensions must be > 0",
        ));
    }

    Ok(())
}

/// Validate raw and output file templates
fn validate_templates(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    if !blueprint.detector.raw_template.contains("{}") {
        return Err(ContractError::config_validation(
            "detector.raw_template",
            format!(
                "raw_template '{}' must contain a '{{}}' module placeholder",
                blueprint.detector.raw_template
            ),
        ));
    }

    let placeholders = blueprint.output.file_template.matches("{}").count();
    if placeholders != 1 {
        return Err(ContractError::config_validation(
            "output.file_template",
            format!(
                "file_template must contain exactly one '{{}}', found {placeholders}"
            ),
        ));
    }

    Ok(())
}

/// Validate scan axes and shape
fn validate_scan(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    let scan = &blueprint.scan;

    if scan.axes.is_empty() {
        return Err(ContractError::config_validation(
            "scan.axes",
            "scan needs at least one axis",
        ));
    }

    if scan.axes.len() != scan.shape.len() {
        return Err(ContractError::config_validation(
            "scan.shape",
            format!(
                "shape has {} dimensions but {} axes are declared",
                scan.shape.len(),
                scan.axes.len()
            ),
        ));
    }

    let mut seen = HashSet::new();
    for axis in &scan.axes {
        if axis.trim().is_empty() {
            return Err(ContractError::config_validation(
                "scan.axes",
                "axis name cannot be empty",
            ));
        }
        if !seen.insert(axis) {
            return Err(ContractError::config_validation(
                format!("scan.axes[{axis}]"),
                "duplicate axis",
            ));
        }
    }

    if let Some(dim) = scan.shape.iter().position(|&len| len == 0) {
        return Err(ContractError::config_validation(
            format!("scan.shape[{dim}]"),
            "scan dimensions must be > 0",
        ));
    }

    Ok(())
}

/// Validate polling intervals
fn validate_sync(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    let sync = &blueprint.sync;
    let intervals = [
        ("sync.poll_interval_ms", sync.poll_interval_ms),
        ("sync.file_poll_interval_ms", sync.file_poll_interval_ms),
        ("sync.dataset_poll_interval_ms", sync.dataset_poll_interval_ms),
    ];

    for (field, value) in intervals {
        if value == 0 {
            return Err(ContractError::config_validation(
                field,
                "poll interval must be > 0",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigVersion, DetectorConfig, ElementType, GridScan, OutputConfig, SyncConfig,
    };
    use std::path::PathBuf;

    fn minimal_blueprint() -> AcquisitionBlueprint {
        AcquisitionBlueprint {
            version: ConfigVersion::V1,
            detector: DetectorConfig {
                name: "EXCALIBUR".into(),
                modules: 6,
                raw_template: "FEM{}".into(),
                data_type: ElementType::Uint16,
                record_shape: vec![256, 2048],
                attribute_shape: vec![1, 1],
            },
            output: OutputConfig {
                directory: PathBuf::from("/tmp"),
                file_template: "{}.h5".into(),
                fill_value: 0,
                overwrite: false,
            },
            scan: GridScan::new(vec!["y".into(), "x".into()], vec![2, 5]),
            sync: SyncConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_modules() {
        let mut bp = minimal_blueprint();
        bp.detector.modules = 0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("at least one detector module"), "got: {err}");
    }

    #[test]
    fn test_zero_record_dimension() {
        let mut bp = minimal_blueprint();
        bp.detector.record_shape = vec![256, 0];
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("record_shape[1]"), "got: {err}");
    }

    #[test]
    fn test_raw_template_without_placeholder() {
        let mut bp = minimal_blueprint();
        bp.detector.raw_template = "FEM".into();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("module placeholder"), "got: {err}");
    }

    #[test]
    fn test_file_template_placeholder_count() {
        let mut bp = minimal_blueprint();
        bp.output.file_template = "{}_{}.h5".into();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("exactly one"), "got: {err}");
    }

    #[test]
    fn test_axes_shape_mismatch() {
        let mut bp = minimal_blueprint();
        bp.scan.shape = vec![2];
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("2 axes"), "got: {err}");
    }

    #[test]
    fn test_duplicate_axis() {
        let mut bp = minimal_blueprint();
        bp.scan.axes = vec!["x".into(), "x".into()];
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate axis"), "got: {err}");
    }

    #[test]
    fn test_zero_poll_interval() {
        let mut bp = minimal_blueprint();
        bp.sync.poll_interval_ms = 0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"), "got: {err}");
    }
}
