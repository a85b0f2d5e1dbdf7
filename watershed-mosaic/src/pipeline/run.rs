//! The pipeline entry point.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{PipelineConfig, PipelineError};
use crate::executor::{ExternalModel, JobExecutor, JobRunner, Ledger, OutputRoute, Priority, Task};
use crate::partition::PartitionOutcome;
use crate::raster::MosaicStore;
use crate::stitch::{
    queue_capacity, stitch_channel, MosaicStitcher, ReclaimMessage, ReclaimReport, StitchError, StitchMessage,
    StitchReport, WorkspaceReclaimer,
};
use crate::vector::{GeoJsonDirectory, SpatialUnitSource};

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Jobs produced by partitioning
    pub jobs_total: usize,
    /// Jobs run by this invocation
    pub executed: usize,
    /// Jobs skipped because an earlier run completed them
    pub skipped: usize,
    /// Subset files written by this invocation
    pub subsets_created: usize,
    /// Mosaic stores created by this invocation
    pub mosaics_created: usize,
    pub stitch: Vec<StitchReport>,
    pub reclaim: ReclaimReport,
    pub duration: Duration,
}

/// One configured run.
pub struct Pipeline<M: ExternalModel> {
    config: PipelineConfig,
    model: Arc<M>,
    source: Arc<dyn SpatialUnitSource>,
    cancel: CancellationToken,
}

impl<M: ExternalModel> Pipeline<M> {
    /// Creates a pipeline reading watersheds from the configured GeoJSON
    /// directory.
    pub fn new(config: PipelineConfig, model: M) -> Self {
        let source: Arc<dyn SpatialUnitSource> = Arc::new(GeoJsonDirectory::new(config.watersheds.clone()));
        Self {
            config,
            model: Arc::new(model),
            source,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the watershed source.
    pub fn with_source(mut self, source: Arc<dyn SpatialUnitSource>) -> Self {
        self.source = source;
        self
    }

    /// Token that stops dispatch of further jobs when cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Partitions the watersheds, or lists the existing jobs if an earlier
    /// run completed partitioning.
    pub async fn partition(&self) -> Result<PartitionOutcome, PipelineError> {
        let partitioner = self.config.partitioner(Arc::clone(&self.source));
        let outcome = tokio::task::spawn_blocking(move || partitioner.run())
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;
        Ok(outcome)
    }

    /// Creates every configured mosaic that does not exist yet.
    ///
    /// Returns the stores by mosaic name and how many were created.
    pub fn create_mosaics(&self) -> Result<(BTreeMap<String, Arc<MosaicStore>>, usize), PipelineError> {
        let mut stores = BTreeMap::new();
        let mut created = 0;
        for name in self.config.mosaic_names() {
            let path = self.config.mosaic_path(name);
            let (store, fresh) = MosaicStore::create_if_absent(&path, self.config.mosaic_spec.clone())?;
            if fresh {
                created += 1;
                tracing::info!(mosaic = %name, path = %path.display(), "Created mosaic");
            }
            stores.insert(name.to_string(), Arc::new(store));
        }
        Ok((stores, created))
    }

    /// Runs the whole pipeline.
    pub async fn run(self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let config = &self.config;
        tracing::info!(
            workspace = %config.workspace.display(),
            outputs = config.outputs.len(),
            max_parallel = config.max_parallel,
            "Starting run"
        );

        // Unresolvable entries only warn
        let resolved = config.catalog.resolve_all();
        let available = resolved.iter().filter(|(_, r)| r.is_available()).count();
        tracing::debug!(entries = resolved.len(), available, "Catalog resolved");

        let outcome = self.partition().await?;
        let (mosaics, mosaics_created) = self.create_mosaics()?;

        let ledger = Ledger::in_workspace(&config.workspace);
        let jobs = outcome.jobs;
        let pending = jobs.iter().filter(|j| !ledger.is_complete(&j.job_id)).count();
        tracing::info!(
            jobs = jobs.len(),
            pending,
            subsets_created = outcome.created,
            "Dispatch queue ready"
        );

        // Workers
        let capacity = queue_capacity(config.flush_threshold) * mosaics.len().max(1);
        let (reclaim_tx, reclaim_rx) = mpsc::channel(capacity);
        let reclaimer = tokio::spawn(
            WorkspaceReclaimer::new(reclaim_rx, config.outputs.len())
                .with_ledger(ledger.clone())
                .run(),
        );

        let mut senders = BTreeMap::new();
        let mut stitchers: Vec<(String, JoinHandle<Result<StitchReport, StitchError>>)> = Vec::new();
        for (name, store) in &mosaics {
            let (tx, rx) = stitch_channel(config.flush_threshold);
            let stitcher = MosaicStitcher::new(name.clone(), Arc::clone(store), rx, reclaim_tx.clone())
                .with_flush_threshold(config.flush_threshold)
                .with_area_weighted(config.area_weighted)
                .with_overlap(config.overlap)
                .with_expected_jobs(pending);
            stitchers.push((name.clone(), tokio::spawn(stitcher.run())));
            senders.insert(name.clone(), tx);
        }

        // Dispatch
        let mut executor = JobExecutor::new(Arc::clone(&self.model), &config.workspace, reclaim_tx.clone())
            .with_inputs(config.inputs.clone())
            .with_parameters(config.parameters.clone())
            .with_target_pixel_size(config.target_pixel_size);
        for output in &config.outputs {
            if let Some(sender) = senders.get(&output.mosaic) {
                executor = executor.with_route(OutputRoute {
                    file_name: output.file_name.clone(),
                    mosaic: output.mosaic.clone(),
                    sender: sender.clone(),
                });
            }
        }
        let executor = Arc::new(executor);

        let mut runner = JobRunner::new(config.max_parallel).with_cancellation(self.cancel.child_token());
        for (position, job) in jobs.iter().cloned().enumerate() {
            let exec = Arc::clone(&executor);
            let check = ledger.clone();
            let job_id = job.job_id.clone();
            let task = Task::new(job.job_id.clone(), Priority::from_position(position), move || async move {
                exec.execute(&job).await.map(|_| ())
            })
            .with_completion_check(move || check.is_complete(&job_id));
            runner.submit(task)?;
        }
        drop(executor);
        let dispatched = runner.join().await;

        // Shutdown: stitchers first, then the reclaimer they signal
        for sender in senders.values() {
            // A stitcher that already failed has dropped its queue
            let _ = sender.send(StitchMessage::Finish).await;
        }
        drop(senders);

        let mut stitch_reports = Vec::with_capacity(stitchers.len());
        let mut stitch_failure: Option<PipelineError> = None;
        for (name, handle) in stitchers {
            match handle.await {
                Ok(Ok(report)) => stitch_reports.push(report),
                Ok(Err(e)) => {
                    tracing::error!(mosaic = %name, error = %e, "Stitcher failed");
                    stitch_failure.get_or_insert(PipelineError::Stitch(e));
                }
                Err(e) => {
                    tracing::error!(mosaic = %name, error = %e, "Stitcher task panicked");
                    stitch_failure.get_or_insert(PipelineError::Join(e.to_string()));
                }
            }
        }

        let _ = reclaim_tx.send(ReclaimMessage::Finish).await;
        drop(reclaim_tx);
        let reclaimed = reclaimer.await.map_err(|e| PipelineError::Join(e.to_string()));

        let runner_summary = dispatched?;
        if let Some(e) = stitch_failure {
            return Err(e);
        }
        let reclaim = reclaimed??;

        let summary = RunSummary {
            jobs_total: jobs.len(),
            executed: runner_summary.executed,
            skipped: runner_summary.skipped,
            subsets_created: outcome.created,
            mosaics_created,
            stitch: stitch_reports,
            reclaim,
            duration: started.elapsed(),
        };
        tracing::info!(
            jobs = summary.jobs_total,
            executed = summary.executed,
            skipped = summary.skipped,
            reclaimed = summary.reclaim.reclaimed,
            elapsed_secs = summary.duration.as_secs(),
            "Run complete"
        );
        Ok(summary)
    }
}
