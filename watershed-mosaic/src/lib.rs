//! watershed-mosaic - global watershed processing in bounded jobs
//!
//! Splits global watershed collections into bounded, geographically coherent
//! jobs, runs an external model once per job with bounded parallelism, and
//! folds every job's output rasters into persistent global mosaics while the
//! run is still going, reclaiming each job workspace once all of its outputs
//! are stitched.
//!
//! # High-Level API
//!
//! ```ignore
//! use watershed_mosaic::config::ConfigFile;
//! use watershed_mosaic::executor::CommandModel;
//! use watershed_mosaic::pipeline::{Pipeline, PipelineConfig};
//!
//! let file = ConfigFile::load()?;
//! let config = PipelineConfig::from_config_file(&file)?;
//! let summary = Pipeline::new(config, CommandModel::new("sdr-model")).run().await?;
//! println!("{} jobs executed", summary.executed);
//! ```

pub mod catalog;
pub mod config;
pub mod coord;
pub mod executor;
pub mod geometry;
pub mod logging;
pub mod partition;
pub mod pipeline;
pub mod raster;
pub mod stitch;
pub mod vector;

/// Version of the library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
