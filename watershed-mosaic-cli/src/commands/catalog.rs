//! Catalog command - show how every catalog entry resolves.

use watershed_mosaic::catalog::Catalog;
use watershed_mosaic::config::ConfigFile;

use super::common::print_header;
use crate::error::CliError;

/// Run the catalog command.
pub fn run(config: &ConfigFile) -> Result<(), CliError> {
    let catalog = Catalog::new(&config.workspace.directory).with_entries(config.catalog.clone());

    print_header("Data Catalog");
    if catalog.is_empty() {
        println!("(no [catalog] entries configured)");
        return Ok(());
    }

    println!("Cache directory: {}", catalog.cache_dir().display());
    println!();

    let resolved = catalog.resolve_all();
    let width = resolved.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, resource) in &resolved {
        println!("  {:<width$}  {}", name, resource, width = width);
    }

    let available = resolved.iter().filter(|(_, r)| r.is_available()).count();
    println!();
    println!("{} of {} entries available locally", available, resolved.len());
    Ok(())
}
