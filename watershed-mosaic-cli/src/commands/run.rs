//! Run command - partition, dispatch, stitch and reclaim.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use watershed_mosaic::pipeline::{Pipeline, RunSummary};

use super::common::{format_duration, print_header};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the run command.
///
/// Ctrl+C stops the run like a failed job does: nothing further is
/// dispatched, running jobs are aborted, and outputs already queued are
/// still stitched.
pub fn run(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("run");
    let config = runner.pipeline_config()?;
    let model = runner.model()?;

    print_header(&format!("watershed-mosaic v{}", watershed_mosaic::VERSION));
    println!("Config:       {}", runner.config_path().display());
    println!("Workspace:    {}", config.workspace.display());
    println!("Watersheds:   {}", config.watersheds.display());
    println!("Model:        {}", model.program());
    println!("Parallel:     {}", config.max_parallel);
    println!("Mosaics:      {}", config.mosaic_dir.display());
    for output in &config.outputs {
        println!("  {} -> {}", output.file_name, output.mosaic);
    }
    println!();

    let shutdown = CancellationToken::new();
    let handler_token = shutdown.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping run");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let pipeline = Pipeline::new(config, model).with_cancellation(shutdown);
    let summary = runtime.block_on(pipeline.run())?;

    print_summary(&summary);
    info!("Run finished");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    print_header("Run complete");
    println!("Jobs:         {}", summary.jobs_total);
    println!("Executed:     {}", summary.executed);
    println!("Skipped:      {} (completed earlier)", summary.skipped);
    println!("Reclaimed:    {} workspaces", summary.reclaim.reclaimed);
    for report in &summary.stitch {
        println!(
            "Mosaic {}: {} outputs in {} flushes, {} tiles written",
            report.mosaic, report.outputs, report.flushes, report.tiles_written
        );
    }
    println!("Elapsed:      {}", format_duration(summary.duration));
}
