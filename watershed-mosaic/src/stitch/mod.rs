//! Incremental mosaic stitching and workspace reclamation.
//!
//! Job outputs are folded into their global mosaics by long-lived workers
//! that consume bounded queues while jobs are still running.
//!
//! # Architecture
//!
//! ```text
//!   JobExecutor ──Output──► [bounded queue] ──► MosaicStitcher ("sed_export")
//!        │                                         │ flush: merge batch
//!        │      Output──► [bounded queue] ──► MosaicStitcher ("n_export")
//!        │                                         │
//!        │                                         ▼ Stitched{job_id, workspace}
//!        └──(no outputs)──Stitched──────────► WorkspaceReclaimer
//!                                                  │ all outputs seen:
//!                                                  ▼ delete + ledger entry
//! ```
//!
//! Each mosaic has exactly one stitcher, so merges into one store are
//! serialized. A full queue blocks the sending job, which is what keeps
//! job fan-out from outrunning merge throughput. Workers stop on an
//! explicit `Finish` message or when every sender has been dropped.

mod progress;
mod reclaimer;
mod stitcher;

pub use progress::Progress;
pub use reclaimer::{ReclaimReport, WorkspaceReclaimer};
pub use stitcher::{MosaicStitcher, StitchReport};

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::executor::ExecutorError;
use crate::raster::RasterError;

/// Default number of buffered outputs that triggers a flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10;

/// Queue capacity for a flush threshold: twice the batch size, at least 1.
pub fn queue_capacity(flush_threshold: usize) -> usize {
    (2 * flush_threshold).max(1)
}

/// Creates the bounded queue feeding one stitcher.
pub fn stitch_channel(flush_threshold: usize) -> (mpsc::Sender<StitchMessage>, mpsc::Receiver<StitchMessage>) {
    mpsc::channel(queue_capacity(flush_threshold))
}

/// One output raster of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub job_id: String,
    /// Workspace of the job, reclaimed once all its outputs are merged
    pub workspace: PathBuf,
    /// Raster somewhere inside `workspace`
    pub path: PathBuf,
    pub band: u32,
}

impl JobOutput {
    pub fn new(job_id: impl Into<String>, workspace: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            job_id: job_id.into(),
            workspace: workspace.into(),
            path: path.into(),
            band: 1,
        }
    }

    /// Signal telling the reclaimer this output has been merged.
    pub fn stitched(&self) -> ReclaimMessage {
        ReclaimMessage::Stitched {
            job_id: self.job_id.clone(),
            workspace: self.workspace.clone(),
        }
    }
}

/// Message consumed by a [`MosaicStitcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StitchMessage {
    Output(JobOutput),
    /// No more outputs: flush and stop
    Finish,
}

/// Message consumed by the [`WorkspaceReclaimer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimMessage {
    /// One output of a job has been merged
    Stitched { job_id: String, workspace: PathBuf },
    /// No more signals: stop
    Finish,
}

/// Errors raised by the stitching workers. Any of them fails the run.
#[derive(Debug, Error)]
pub enum StitchError {
    /// A merge into a mosaic failed
    #[error("mosaic '{mosaic}': {source}")]
    Merge {
        mosaic: String,
        #[source]
        source: RasterError,
    },

    /// A merged workspace could not be deleted
    #[error("failed to remove workspace {path}: {source}")]
    Reclaim {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Completion could not be recorded
    #[error("failed to record completion of {job_id}: {source}")]
    Ledger {
        job_id: String,
        #[source]
        source: ExecutorError,
    },

    /// The reclaimer stopped before a stitcher could signal it
    #[error("mosaic '{mosaic}': reclaimer queue is closed")]
    ReclaimerClosed { mosaic: String },

    /// Blocking worker could not be joined
    #[error("blocking task failed: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_capacity_is_twice_threshold() {
        assert_eq!(queue_capacity(10), 20);
        assert_eq!(queue_capacity(0), 1);
    }

    #[test]
    fn test_stitched_signal_names_job_workspace() {
        // Nested output: the workspace is not the file's parent
        let output = JobOutput::new(
            "basins_2",
            "/ws/jobs/basins_2",
            "/ws/jobs/basins_2/intermediate/sed_export.wgr",
        );
        assert_eq!(output.band, 1);
        assert_eq!(
            output.stitched(),
            ReclaimMessage::Stitched {
                job_id: "basins_2".into(),
                workspace: PathBuf::from("/ws/jobs/basins_2"),
            }
        );
    }
}
