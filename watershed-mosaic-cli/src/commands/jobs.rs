//! Jobs command - list the dispatch queue in dispatch order.

use watershed_mosaic::config::ConfigFile;
use watershed_mosaic::executor::Ledger;
use watershed_mosaic::partition::{list_jobs, JobSpec, PARTITION_MARKER};
use watershed_mosaic::pipeline::SUBSETS_DIR;

use crate::error::CliError;

/// Run the jobs command.
///
/// # Arguments
///
/// * `config` - Loaded configuration; only the workspace is read
/// * `limit` - Print at most this many jobs
pub fn run(config: &ConfigFile, limit: Option<usize>) -> Result<(), CliError> {
    let workspace = &config.workspace.directory;
    let subset_dir = workspace.join(SUBSETS_DIR);
    if !subset_dir.join(PARTITION_MARKER).exists() {
        println!("Partitioning has not completed in {}.", workspace.display());
        println!("Run 'watershed-mosaic partition' first.");
        return Ok(());
    }

    let jobs = list_jobs(&subset_dir)?;
    let ledger = Ledger::in_workspace(workspace);
    let done = jobs.iter().filter(|j| ledger.is_complete(&j.job_id)).count();

    let shown = limit.unwrap_or(jobs.len()).min(jobs.len());
    for line in format_jobs(&jobs[..shown], &ledger) {
        println!("{}", line);
    }
    if shown < jobs.len() {
        println!("... {} more", jobs.len() - shown);
    }
    println!();
    println!("{} jobs, {} complete, {} pending", jobs.len(), done, jobs.len() - done);
    Ok(())
}

fn format_jobs(jobs: &[JobSpec], ledger: &Ledger) -> Vec<String> {
    let width = jobs.iter().map(|j| j.job_id.len()).max().unwrap_or(0);
    jobs.iter()
        .enumerate()
        .map(|(i, job)| {
            let state = if ledger.is_complete(&job.job_id) { "done" } else { "pending" };
            format!(
                "{:>5}  {:<width$}  {:>14.6}  {:<7}  {}",
                i + 1,
                job.job_id,
                job.area,
                state,
                job.subset_path.display(),
                width = width
            )
        })
        .collect()
}
