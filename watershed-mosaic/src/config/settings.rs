//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::coord::BoundingBox;
use crate::raster::{OverlapPolicy, ResampleMethod};

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Run workspace settings
    pub workspace: WorkspaceSettings,
    /// Watershed partitioning settings
    pub partition: PartitionFileSettings,
    /// Job execution settings
    pub executor: ExecutorSettings,
    /// Stitcher queue settings
    pub stitch: StitchSettings,
    /// Global mosaic layout and merge policy
    pub mosaic: MosaicSettings,
    /// Global input rasters by logical name (`[inputs]`)
    pub inputs: BTreeMap<String, String>,
    /// Per-input resample method (`[resample]`)
    pub resample: BTreeMap<String, ResampleMethod>,
    /// Output file name to mosaic name (`[outputs]`)
    pub outputs: BTreeMap<String, String>,
    /// Model parameters passed through verbatim (`[model]`)
    pub model: BTreeMap<String, f64>,
    /// Data catalog (`[catalog]`)
    pub catalog: BTreeMap<String, String>,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Workspace configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSettings {
    /// Root of the run workspace (subsets, job workspaces, ledger, logs)
    pub directory: PathBuf,
}

/// Partitioner configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionFileSettings {
    /// Directory of GeoJSON watershed collections
    pub watersheds: Option<PathBuf>,
    /// Grid cell size in degrees for bucketing small features
    pub degree_separation: u32,
    /// Features larger than this become their own job
    pub singleton_area: f64,
    /// Feature cap per bucketed job
    pub max_features_per_job: usize,
    /// Explicit `collection:fid` pairs to restrict the run to
    pub subset: Option<String>,
}

/// Executor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    /// Maximum concurrently running jobs
    pub max_parallel: usize,
    /// Model program run once per job
    pub model_program: Option<String>,
    /// Arguments placed before the model configuration path
    pub model_args: Vec<String>,
    /// Pixel size in target projection units
    pub target_pixel_size: f64,
}

/// Stitcher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchSettings {
    /// Buffered outputs that trigger a merge; queues hold twice this
    pub flush_threshold: usize,
}

/// Global mosaic configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicSettings {
    /// Directory holding `<name>.mosaic` stores (default: `<workspace>/mosaics`)
    pub directory: Option<PathBuf>,
    /// Pixel size in degrees
    pub pixel_size: f64,
    pub nodata: f64,
    /// Geographic extent of every mosaic
    pub bounds: BoundingBox,
    /// Tile edge length in pixels
    pub tile_size: usize,
    /// Scale merged values by pixel area
    pub area_weighted: bool,
    pub overlap: OverlapPolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Log file path (default: `<workspace>/watershed-mosaic.log`)
    pub file: Option<PathBuf>,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}
