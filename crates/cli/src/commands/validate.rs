//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{AcquisitionBlueprint, ScanGeometry};
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    detector: String,
    module_count: usize,
    scan_points: usize,
    output: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_blueprint(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    detector: blueprint.detector.name.clone(),
                    module_count: blueprint.detector.modules,
                    scan_points: blueprint.scan.size(),
                    output: blueprint.output_path().display().to_string(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &AcquisitionBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sync.attach_timeout_ms.is_none() {
        warnings.push(
            "sync.attach_timeout_ms is not set - a missing module file blocks until cancelled"
                .to_string(),
        );
    }

    if blueprint.sync.missed_tolerance == 0 {
        warnings.push("sync.missed_tolerance is 0 - every duplicate id ends a tick".to_string());
    }

    if blueprint.output.overwrite {
        warnings.push(format!(
            "output.overwrite is enabled - {} will be replaced",
            blueprint.output_path().display()
        ));
    }

    if !blueprint.detector.data_type.is_integer() && blueprint.output.fill_value != 0 {
        warnings.push("output.fill_value is applied to a floating point payload".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Detector: {}", summary.detector);
            println!("  Modules: {}", summary.module_count);
            println!("  Scan points: {}", summary.scan_points);
            println!("  Output: {}", summary.output);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
