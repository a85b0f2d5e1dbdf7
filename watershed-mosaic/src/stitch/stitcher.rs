//! Per-mosaic stitching worker.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use super::{JobOutput, Progress, ReclaimMessage, StitchError, StitchMessage, DEFAULT_FLUSH_THRESHOLD};
use crate::raster::{merge_into_mosaic, MergeSource, MergeStats, MosaicStore, OverlapPolicy, ResampleMethod};

/// Totals reported by a stopped stitcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StitchReport {
    pub mosaic: String,
    pub flushes: usize,
    pub outputs: usize,
    pub tiles_written: usize,
}

/// Drains one mosaic's queue and merges outputs into it in batches.
///
/// A batch is flushed when more than `flush_threshold` outputs are
/// buffered, and once more when the queue finishes. After every flush the
/// reclaimer is told which workspaces contributed.
pub struct MosaicStitcher {
    name: String,
    store: Arc<MosaicStore>,
    rx: mpsc::Receiver<StitchMessage>,
    reclaim: mpsc::Sender<ReclaimMessage>,
    flush_threshold: usize,
    area_weighted: bool,
    overlap: OverlapPolicy,
    progress: Progress,
}

impl MosaicStitcher {
    /// Creates a stitcher.
    ///
    /// # Arguments
    ///
    /// * `name` - Mosaic name, used in logs and errors
    /// * `store` - Mosaic this stitcher exclusively writes
    /// * `rx` - Queue of outputs, see [`super::stitch_channel`]
    /// * `reclaim` - Reclaimer queue signalled after each flush
    pub fn new(
        name: impl Into<String>,
        store: Arc<MosaicStore>,
        rx: mpsc::Receiver<StitchMessage>,
        reclaim: mpsc::Sender<ReclaimMessage>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            rx,
            reclaim,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            area_weighted: true,
            overlap: OverlapPolicy::Replace,
            progress: Progress::new(0),
        }
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_area_weighted(mut self, area_weighted: bool) -> Self {
        self.area_weighted = area_weighted;
        self
    }

    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    /// Number of jobs expected to report, for progress logging.
    pub fn with_expected_jobs(mut self, expected: usize) -> Self {
        self.progress = Progress::new(expected);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs until `Finish` arrives or all senders are dropped.
    pub async fn run(mut self) -> Result<StitchReport, StitchError> {
        tracing::info!(mosaic = %self.name, threshold = self.flush_threshold, "Stitcher starting");
        let mut report = StitchReport {
            mosaic: self.name.clone(),
            ..StitchReport::default()
        };
        let mut buffer: Vec<JobOutput> = Vec::new();

        loop {
            match self.rx.recv().await {
                Some(StitchMessage::Output(output)) => {
                    tracing::trace!(mosaic = %self.name, job_id = %output.job_id, "Output queued");
                    buffer.push(output);
                    if buffer.len() > self.flush_threshold {
                        self.flush(&mut buffer, &mut report).await?;
                    }
                }
                Some(StitchMessage::Finish) | None => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer, &mut report).await?;
                    }
                    break;
                }
            }
        }

        tracing::info!(
            mosaic = %self.name,
            flushes = report.flushes,
            outputs = report.outputs,
            "Stitcher stopped"
        );
        Ok(report)
    }

    async fn flush(&mut self, buffer: &mut Vec<JobOutput>, report: &mut StitchReport) -> Result<(), StitchError> {
        let batch = std::mem::take(buffer);
        let started = Instant::now();
        let stats = self.merge(&batch).await.map_err(|e| {
            tracing::error!(mosaic = %self.name, batch = batch.len(), error = %e, "Mosaic merge failed");
            e
        })?;

        for output in &batch {
            self.reclaim
                .send(output.stitched())
                .await
                .map_err(|_| StitchError::ReclaimerClosed {
                    mosaic: self.name.clone(),
                })?;
        }

        report.flushes += 1;
        report.outputs += batch.len();
        report.tiles_written += stats.tiles_written;
        self.progress.record(batch.len());

        tracing::info!(
            mosaic = %self.name,
            batch = batch.len(),
            tiles = stats.tiles_written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            processed = self.progress.processed(),
            expected = self.progress.expected(),
            jobs_per_sec = format_args!("{:.2}", self.progress.throughput()),
            eta_secs = self.progress.eta().map(|d| d.as_secs()).unwrap_or(0),
            "Flushed batch"
        );
        Ok(())
    }

    async fn merge(&self, batch: &[JobOutput]) -> Result<MergeStats, StitchError> {
        let sources: Vec<MergeSource> = batch
            .iter()
            .map(|o| MergeSource::new(o.path.clone(), o.band))
            .collect();
        // Outputs are already on the target grid
        let methods = vec![ResampleMethod::Nearest; sources.len()];
        let store = Arc::clone(&self.store);
        let area_weighted = self.area_weighted;
        let overlap = self.overlap;

        let merged = tokio::task::spawn_blocking(move || {
            merge_into_mosaic(&sources, &methods, &store, 1, area_weighted, overlap)
        })
        .await
        .map_err(|e| StitchError::Join(e.to_string()))?;

        merged.map_err(|source| StitchError::Merge {
            mosaic: self.name.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{BoundingBox, Crs};
    use crate::raster::{GeoTransform, GridRaster, MosaicSpec, PixelWindow, RasterSource};
    use crate::stitch::stitch_channel;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn store(dir: &Path) -> Arc<MosaicStore> {
        let spec = MosaicSpec::new(BoundingBox::new(0.0, 0.0, 8.0, 2.0), 1.0, -1.0, 4);
        let (store, _) = MosaicStore::create_if_absent(&dir.join("sed.mosaic"), spec).unwrap();
        Arc::new(store)
    }

    fn job_output(dir: &Path, job: &str, x0: f64, value: f32) -> JobOutput {
        let ws = dir.join("jobs").join(job);
        std::fs::create_dir_all(&ws).unwrap();
        let raster = GridRaster {
            width: 2,
            height: 2,
            transform: GeoTransform::new(x0, 1.0, 2.0, -1.0),
            nodata: -9999.0,
            crs: Crs::Geographic,
            data: vec![value; 4],
        };
        let path = ws.join("sed_export.wgr");
        raster.write(&path).unwrap();
        JobOutput::new(job, ws, path)
    }

    async fn drain(mut rx: mpsc::Receiver<ReclaimMessage>) -> Vec<PathBuf> {
        let mut seen = Vec::new();
        while let Some(ReclaimMessage::Stitched { workspace, .. }) = rx.recv().await {
            seen.push(workspace);
        }
        seen
    }

    #[tokio::test]
    async fn test_finish_flushes_buffered_outputs_once() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let (tx, rx) = stitch_channel(10);
        let (reclaim_tx, reclaim_rx) = mpsc::channel(16);
        let stitcher = MosaicStitcher::new("sed", Arc::clone(&store), rx, reclaim_tx)
            .with_flush_threshold(10)
            .with_area_weighted(false);
        let handle = tokio::spawn(stitcher.run());

        tx.send(StitchMessage::Output(job_output(dir.path(), "a", 0.0, 1.0)))
            .await
            .unwrap();
        tx.send(StitchMessage::Output(job_output(dir.path(), "b", 4.0, 2.0)))
            .await
            .unwrap();
        tx.send(StitchMessage::Finish).await.unwrap();

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.flushes, 1);
        assert_eq!(report.outputs, 2);

        let pixels = store.read_window(PixelWindow::new(0, 0, 8, 1)).unwrap();
        assert_eq!(pixels, vec![1.0f32, 1.0, -1.0, -1.0, 2.0, 2.0, -1.0, -1.0]);

        let signalled = drain(reclaim_rx).await;
        assert_eq!(
            signalled,
            vec![dir.path().join("jobs/a"), dir.path().join("jobs/b")]
        );
    }

    #[tokio::test]
    async fn test_flushes_when_threshold_exceeded() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let (tx, rx) = stitch_channel(1);
        let (reclaim_tx, reclaim_rx) = mpsc::channel(16);
        let stitcher = MosaicStitcher::new("sed", store, rx, reclaim_tx).with_flush_threshold(1);
        let handle = tokio::spawn(stitcher.run());

        for (i, job) in ["a", "b", "c"].iter().enumerate() {
            tx.send(StitchMessage::Output(job_output(dir.path(), job, i as f64 * 2.0, 1.0)))
                .await
                .unwrap();
        }
        drop(tx);

        let report = handle.await.unwrap().unwrap();
        // Two outputs exceed the threshold, the third is flushed on close
        assert_eq!(report.flushes, 2);
        assert_eq!(report.outputs, 3);
        assert_eq!(drain(reclaim_rx).await.len(), 3);
    }

    #[tokio::test]
    async fn test_finish_with_empty_buffer_does_not_merge() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let (tx, rx) = stitch_channel(10);
        let (reclaim_tx, _reclaim_rx) = mpsc::channel(1);
        let handle = tokio::spawn(MosaicStitcher::new("sed", Arc::clone(&store), rx, reclaim_tx).run());

        tx.send(StitchMessage::Finish).await.unwrap();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.flushes, 0);
        assert_eq!(store.written_tiles().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_merge_failure_is_reported_and_not_signalled() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let (tx, rx) = stitch_channel(10);
        let (reclaim_tx, reclaim_rx) = mpsc::channel(16);
        let handle = tokio::spawn(MosaicStitcher::new("sed", store, rx, reclaim_tx).run());

        tx.send(StitchMessage::Output(JobOutput::new(
            "ghost",
            dir.path().join("jobs/ghost"),
            dir.path().join("jobs/ghost/sed_export.wgr"),
        )))
        .await
        .unwrap();
        tx.send(StitchMessage::Finish).await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, StitchError::Merge { ref mosaic, .. } if mosaic == "sed"));
        assert!(drain(reclaim_rx).await.is_empty());
    }
}
