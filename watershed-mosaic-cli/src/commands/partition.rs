//! Partition command - split watersheds into jobs without running them.

use std::sync::Arc;

use tracing::info;
use watershed_mosaic::partition::PartitionOutcome;
use watershed_mosaic::vector::GeoJsonDirectory;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the partition command.
pub fn run(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("partition");
    let config = runner.pipeline_config()?;

    println!("Watersheds: {}", config.watersheds.display());
    println!("Subsets:    {}", config.subset_dir().display());
    println!();

    let source = Arc::new(GeoJsonDirectory::new(config.watersheds.clone()));
    let outcome = config.partitioner(source).run()?;
    report(&outcome);
    info!(
        jobs = outcome.jobs.len(),
        created = outcome.created,
        reused = outcome.reused,
        "Partitioning complete"
    );
    Ok(())
}

fn report(outcome: &PartitionOutcome) {
    if outcome.from_marker {
        println!("Partitioning already complete; existing subsets reused.");
    } else {
        println!(
            "Wrote {} subset files ({} already present).",
            outcome.created, outcome.reused
        );
    }
    let total_area: f64 = outcome.jobs.iter().map(|j| j.area).sum();
    println!("{} jobs, total area {:.6}", outcome.jobs.len(), total_area);
}
