//! Init command - write a commented default configuration file.

use std::path::Path;

use watershed_mosaic::config::ConfigFile;

use crate::error::CliError;

/// Run the init command.
///
/// Refuses to replace an existing file unless `force` is set.
pub fn run(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::AlreadyExists(path.to_path_buf()));
    }

    ConfigFile::default().save_to(path)?;

    println!("Wrote default configuration to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set [partition] watersheds to your GeoJSON collection directory");
    println!("  2. Set [executor] model_program to the model to run per job");
    println!("  3. Map model outputs to mosaics in [outputs]");
    Ok(())
}
