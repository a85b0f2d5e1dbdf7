//! Run orchestration.
//!
//! Wires the partitioner, job runner, stitchers and reclaimer into one run.
//!
//! # Run lifecycle
//!
//! ```text
//! resolve catalog ─► partition ─► create mosaics ─► start stitchers + reclaimer
//!                                                          │
//!        ┌─────────────────────────────────────────────────┘
//!        ▼
//!   dispatch jobs (area descending, bounded parallelism)
//!        │  success or first failure
//!        ▼
//!   Finish ─► stitchers flush and stop ─► Finish ─► reclaimer stops
//!        │
//!        ▼
//!   first error (job, then stitch, then reclaim) or RunSummary
//! ```
//!
//! A failed run leaves mosaics, subset files and the completion ledger in
//! place, so the next run skips partitioning and completed jobs.

mod config;
mod run;

pub use config::{mosaic_path, OutputMapping, PipelineConfig, SUBSETS_DIR};
pub use run::{Pipeline, RunSummary};

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::executor::ExecutorError;
use crate::partition::PartitionError;
use crate::raster::RasterError;
use crate::stitch::StitchError;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or inconsistent run configuration
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Partitioning integrity failure
    #[error("partitioning failed: {0}")]
    Partition(#[from] PartitionError),

    /// Mosaic creation or inspection failure
    #[error("mosaic error: {0}")]
    Raster(#[from] RasterError),

    /// A job failed
    #[error("job execution failed: {0}")]
    Executor(#[from] ExecutorError),

    /// A stitcher or the reclaimer failed
    #[error("stitching failed: {0}")]
    Stitch(#[from] StitchError),

    /// Workspace I/O failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A worker task panicked
    #[error("worker task failed: {0}")]
    Join(String),
}
