//! Job execution.
//!
//! Runs the external model once per job with bounded parallelism and hands
//! every output raster to the stitcher responsible for it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         JobRunner                            │
//! │  priority queue ─► semaphore (max_parallel) ─► JoinSet       │
//! │  first failure: stop dispatch, abort in-flight, return error │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ one task per job
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        JobExecutor                           │
//! │  read subset ─► clip inputs ─► ExternalModel ─► enqueue      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Jobs whose workspace has already been fully stitched are recorded in the
//! [`Ledger`] and skipped by later runs.

mod job;
mod ledger;
mod model;
mod runner;

pub use job::{InputRaster, JobExecutor, JobReport, OutputRoute, INPUTS_DIR, JOBS_DIR};
pub use ledger::{Ledger, LEDGER_DIR, LEDGER_EXTENSION};
pub use model::{CommandModel, ExternalModel, ModelInvocation, MODEL_CONFIG_FILE};
pub use runner::{JobRunner, Priority, RunnerSummary, Task, TaskFuture};

use std::path::PathBuf;

use thiserror::Error;

use crate::coord::CoordError;
use crate::raster::RasterError;
use crate::vector::VectorError;

/// Failure reported by an external model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model program could not be started
    #[error("failed to start model '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Model program exited unsuccessfully
    #[error("model '{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Could not write the model configuration
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Model-specific failure
    #[error("{0}")]
    Other(String),
}

/// Errors raised while executing jobs. Every one of them is fatal to the
/// run: there is no per-job retry.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The external model raised
    #[error("job {job_id}: {source}")]
    Model {
        job_id: String,
        #[source]
        source: ModelError,
    },

    /// Subset file could not be read
    #[error("job {job_id}: {source}")]
    Vector {
        job_id: String,
        #[source]
        source: VectorError,
    },

    /// Input clipping failed
    #[error("job {job_id}: {source}")]
    Raster {
        job_id: String,
        #[source]
        source: RasterError,
    },

    /// Job extent could not be transformed
    #[error("job {job_id}: {source}")]
    Coord {
        job_id: String,
        #[source]
        source: CoordError,
    },

    /// Workspace or ledger I/O failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Model succeeded but did not write an expected output
    #[error("job {job_id}: model did not produce {path}")]
    MissingOutput { job_id: String, path: PathBuf },

    /// A stitcher queue closed before the job could report to it
    #[error("job {job_id}: queue for '{queue}' is closed")]
    QueueClosed { job_id: String, queue: String },

    /// A task with the same name was already submitted
    #[error("duplicate task name '{0}'")]
    DuplicateTask(String),

    /// A task panicked or was aborted unexpectedly
    #[error("task '{name}' did not complete: {message}")]
    TaskPanicked { name: String, message: String },

    /// The run was cancelled before all tasks were dispatched
    #[error("run cancelled")]
    Cancelled,

    /// Blocking worker could not be joined
    #[error("blocking task failed: {0}")]
    Join(String),
}
