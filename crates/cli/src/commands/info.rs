//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{AcquisitionBlueprint, DatasetDescriptor, ScanGeometry};
use serde::Serialize;
use sync_engine::OutputSkeletonBuilder;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    detector: DetectorInfo,
    output: String,
    raw_files: Vec<String>,
    scan: ScanInfo,
    sync_settings: SyncInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    datasets: Vec<DatasetDescriptor>,
}

#[derive(Serialize)]
struct DetectorInfo {
    name: String,
    modules: usize,
    data_type: String,
    record_shape: Vec<usize>,
    stitched_shape: Vec<usize>,
}

#[derive(Serialize)]
struct ScanInfo {
    axes: Vec<String>,
    shape: Vec<usize>,
    points: usize,
    snake: bool,
}

#[derive(Serialize)]
struct SyncInfo {
    missed_tolerance: u32,
    poll_interval_ms: u64,
    file_poll_interval_ms: u64,
    dataset_poll_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    attach_timeout_ms: Option<u64>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &AcquisitionBlueprint, args: &InfoArgs) -> ConfigInfo {
    let builder = OutputSkeletonBuilder::new(blueprint);
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        detector: DetectorInfo {
            name: blueprint.detector.name.clone(),
            modules: blueprint.detector.modules,
            data_type: format!("{:?}", blueprint.detector.data_type),
            record_shape: blueprint.detector.record_shape.clone(),
            stitched_shape: builder.payload(&blueprint.scan).shape,
        },
        output: blueprint.output_path().display().to_string(),
        raw_files: blueprint
            .raw_paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        scan: ScanInfo {
            axes: blueprint.scan.axes.clone(),
            shape: blueprint.scan.shape.clone(),
            points: blueprint.scan.size(),
            snake: blueprint.scan.snake,
        },
        sync_settings: SyncInfo {
            missed_tolerance: blueprint.sync.missed_tolerance,
            poll_interval_ms: blueprint.sync.poll_interval_ms,
            file_poll_interval_ms: blueprint.sync.file_poll_interval_ms,
            dataset_poll_interval_ms: blueprint.sync.dataset_poll_interval_ms,
            attach_timeout_ms: blueprint.sync.attach_timeout_ms,
        },
        datasets: if args.datasets {
            builder.descriptors(&blueprint.scan)
        } else {
            Vec::new()
        },
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("\n=== Acquisition Configuration ===\n");
    println!("Version: {}", info.version);

    println!("\nDetector: {}", info.detector.name);
    println!("  Modules: {}", info.detector.modules);
    println!("  Data type: {}", info.detector.data_type);
    println!("  Record shape: {:?}", info.detector.record_shape);
    println!("  Stitched shape: {:?}", info.detector.stitched_shape);

    println!("\nOutput: {}", info.output);
    println!("Raw files ({}):", info.raw_files.len());
    for file in &info.raw_files {
        println!("  - {}", file);
    }

    println!("\nScan:");
    println!("  Axes: {:?}", info.scan.axes);
    println!("  Shape: {:?} ({} points)", info.scan.shape, info.scan.points);
    if info.scan.snake {
        println!("  Snake: yes");
    }

    println!("\nSync Settings:");
    println!("  Missed tolerance: {}", info.sync_settings.missed_tolerance);
    println!("  Poll interval: {} ms", info.sync_settings.poll_interval_ms);
    println!("  File poll interval: {} ms", info.sync_settings.file_poll_interval_ms);
    println!(
        "  Dataset poll interval: {} ms",
        info.sync_settings.dataset_poll_interval_ms
    );
    if let Some(ms) = info.sync_settings.attach_timeout_ms {
        println!("  Attach timeout: {} ms", ms);
    }

    if !info.datasets.is_empty() {
        println!("\nDatasets ({}):", info.datasets.len());
        for dataset in &info.datasets {
            println!(
                "  - {} ({:?}, rank {}) at {}",
                dataset.name, dataset.dataset_type, dataset.rank, dataset.path
            );
        }
    }

    println!();
}
