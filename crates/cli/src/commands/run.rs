//! `run` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use container::FsStore;
use contracts::{AcquisitionBlueprint, ScanGeometry};
use sync_engine::{DatasetSyncEngine, RunOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::load_blueprint;
use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_sync(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut blueprint, args);
    let steps = resolve_steps(&blueprint, args)?;

    info!(
        output = %blueprint.output_path().display(),
        modules = blueprint.detector.modules,
        points = blueprint.scan.size(),
        steps,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint, args.completed_steps, steps);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let store = FsStore::new();
    let mut engine = DatasetSyncEngine::new(store.clone(), blueprint.clone());
    let descriptors = engine
        .configure(Arc::new(blueprint.scan.clone()), args.completed_steps, steps)
        .context("Failed to create output skeleton")?;
    for descriptor in &descriptors {
        info!(
            name = %descriptor.name,
            path = %descriptor.path,
            rank = descriptor.rank,
            "Dataset produced"
        );
    }

    let simulation_token = CancellationToken::new();
    let simulator = args.simulate.then(|| {
        info!(interval_ms = args.simulate_interval_ms, "Simulating detector modules");
        tokio::spawn(container::simulate(
            store.clone(),
            blueprint.clone(),
            Duration::from_millis(args.simulate_interval_ms),
            simulation_token.clone(),
        ))
    });

    let cancel = engine.cancel_token();
    let signal = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping synchronization...");
        cancel.cancel();
    });

    info!("Starting synchronization...");
    let outcome = engine.run().await;
    signal.abort();
    simulation_token.cancel();

    if let Some(simulator) = simulator {
        let written = simulator
            .await
            .context("Simulator task failed")?
            .context("Simulator could not write module files")?;
        info!(written, "Simulation finished");
    }

    match outcome.context("Synchronization failed")? {
        RunOutcome::Completed => {
            engine.post_run_ready();
            info!(
                current_idx = engine.cursor().current_idx,
                "Synchronization completed successfully"
            );
            println!("{}", engine.progress().summary());
        }
        RunOutcome::Cancelled => {
            warn!(current_idx = engine.cursor().current_idx, "Synchronization cancelled");
        }
        RunOutcome::NotReady => {
            engine.abort();
            warn!("Output has no id array, nothing was synchronized");
        }
    }

    info!("VDS sync finished");
    Ok(())
}

fn apply_overrides(blueprint: &mut AcquisitionBlueprint, args: &RunArgs) {
    if let Some(ref directory) = args.directory {
        info!(directory = %directory.display(), "Overriding output directory from CLI");
        blueprint.output.directory = directory.clone();
    }
    if let Some(tolerance) = args.tolerance {
        info!(tolerance, "Overriding missed-observation tolerance from CLI");
        blueprint.sync.missed_tolerance = tolerance;
    }
    if args.overwrite {
        blueprint.output.overwrite = true;
    }
}

/// Steps to synchronize, defaulting to the rest of the scan
fn resolve_steps(blueprint: &AcquisitionBlueprint, args: &RunArgs) -> Result<u64, CliError> {
    let size = blueprint.scan.size();
    let remaining = (size as u64).saturating_sub(args.completed_steps);
    let steps = args.steps.unwrap_or(remaining);
    if args.completed_steps + steps > size as u64 {
        return Err(CliError::StepsOutOfRange {
            completed: args.completed_steps,
            steps,
            size,
        });
    }
    Ok(steps)
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &AcquisitionBlueprint, completed: u64, steps: u64) {
    println!("\n=== Configuration Summary ===\n");
    println!("Detector: {}", blueprint.detector.name);
    println!("  Modules: {}", blueprint.detector.modules);
    println!("  Record shape: {:?}", blueprint.detector.record_shape);
    println!("  Data type: {:?}", blueprint.detector.data_type);
    println!("\nOutput: {}", blueprint.output_path().display());
    for path in blueprint.raw_paths() {
        println!("  - {}", path.display());
    }
    println!(
        "\nScan: axes {:?}, shape {:?} ({} points)",
        blueprint.scan.axes,
        blueprint.scan.shape,
        blueprint.scan.size()
    );
    println!("  Steps: {} after {}", steps, completed);
    println!("\nSync Settings:");
    println!("  Missed tolerance: {}", blueprint.sync.missed_tolerance);
    println!("  Poll interval: {} ms", blueprint.sync.poll_interval_ms);
    match blueprint.sync.attach_timeout_ms {
        Some(ms) => println!("  Attach timeout: {} ms", ms),
        None => println!("  Attach timeout: none"),
    }
    println!();
}
