//! Default values for all configuration settings.
//!
//! Contains the `DEFAULT_*` constants, CPU helpers, and the
//! `ConfigFile::default()` implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::settings::*;
use crate::coord::BoundingBox;
use crate::partition::{DEFAULT_DEGREE_SEPARATION, DEFAULT_MAX_FEATURES_PER_JOB, DEFAULT_SINGLETON_AREA};
use crate::raster::OverlapPolicy;
use crate::stitch::DEFAULT_FLUSH_THRESHOLD;

/// Get the number of available CPU cores.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Default run workspace, relative to the current directory.
pub const DEFAULT_WORKSPACE_DIR: &str = "watershed_workspace";

/// Default target pixel size in projected units (metres).
pub const DEFAULT_TARGET_PIXEL_SIZE: f64 = 300.0;

/// Default mosaic pixel size: 10 arc-seconds.
pub const DEFAULT_MOSAIC_PIXEL_SIZE: f64 = 1.0 / 360.0;

pub const DEFAULT_MOSAIC_NODATA: f64 = -1.0;

pub const DEFAULT_MOSAIC_TILE_SIZE: usize = 256;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log file name inside the workspace.
pub const DEFAULT_LOG_FILE_NAME: &str = "watershed-mosaic.log";

/// Default mosaic directory name inside the workspace.
pub const DEFAULT_MOSAIC_DIR_NAME: &str = "mosaics";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            workspace: WorkspaceSettings {
                directory: PathBuf::from(DEFAULT_WORKSPACE_DIR),
            },
            partition: PartitionFileSettings {
                watersheds: None,
                degree_separation: DEFAULT_DEGREE_SEPARATION,
                singleton_area: DEFAULT_SINGLETON_AREA,
                max_features_per_job: DEFAULT_MAX_FEATURES_PER_JOB,
                subset: None,
            },
            executor: ExecutorSettings {
                max_parallel: num_cpus(),
                model_program: None,
                model_args: Vec::new(),
                target_pixel_size: DEFAULT_TARGET_PIXEL_SIZE,
            },
            stitch: StitchSettings {
                flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            },
            mosaic: MosaicSettings {
                directory: None,
                pixel_size: DEFAULT_MOSAIC_PIXEL_SIZE,
                nodata: DEFAULT_MOSAIC_NODATA,
                bounds: BoundingBox::world(),
                tile_size: DEFAULT_MOSAIC_TILE_SIZE,
                area_weighted: true,
                overlap: OverlapPolicy::Replace,
            },
            inputs: BTreeMap::new(),
            resample: BTreeMap::new(),
            outputs: BTreeMap::new(),
            model: BTreeMap::new(),
            catalog: BTreeMap::new(),
            logging: LoggingSettings {
                file: None,
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}

impl ConfigFile {
    /// Mosaic directory, defaulting to `<workspace>/mosaics`.
    pub fn mosaic_directory(&self) -> PathBuf {
        self.mosaic
            .directory
            .clone()
            .unwrap_or_else(|| self.workspace.directory.join(DEFAULT_MOSAIC_DIR_NAME))
    }

    /// Log file, defaulting to `<workspace>/watershed-mosaic.log`.
    pub fn log_file(&self) -> PathBuf {
        self.logging
            .file
            .clone()
            .unwrap_or_else(|| self.workspace.directory.join(DEFAULT_LOG_FILE_NAME))
    }
}
