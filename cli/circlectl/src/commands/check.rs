//! Check command.
//!
//! Operates purely on a local build configuration file (offline).

use std::path::Path;

use crate::error::CliError;
use crate::output::print_success;

pub fn run(path: &Path) -> Result<(), CliError> {
    crate::build_config::validate_path(path).map_err(CliError::Validation)?;
    print_success(&format!("Config file is valid: {}", path.display()));
    Ok(())
}
