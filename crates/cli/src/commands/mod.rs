//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_sync;
pub use validate::run_validate;

use std::path::Path;

use contracts::AcquisitionBlueprint;

use crate::error::{CliError, Result};

/// Load and validate a configuration file
fn load_blueprint(path: &Path) -> Result<AcquisitionBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    Ok(config_loader::ConfigLoader::load_from_path(path)?)
}
