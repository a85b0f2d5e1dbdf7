//! Integration tests for a full pipeline run.
//!
//! These tests drive partitioning, dispatch, stitching and reclamation end
//! to end with an in-process model:
//! - Outputs of every job land in the mosaic and workspaces are reclaimed
//! - Mosaic content does not depend on job completion order
//! - A failing job stops the run and keeps its workspace
//! - A resumed run skips partitioning and completed jobs
//! - Saturated stitcher queues never lose outputs
//! - With several outputs, a workspace survives until every one is merged

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use watershed_mosaic::coord::{BoundingBox, Crs};
use watershed_mosaic::executor::{ExecutorError, ExternalModel, InputRaster, Ledger, ModelError, ModelInvocation};
use watershed_mosaic::partition::PartitionSettings;
use watershed_mosaic::pipeline::{Pipeline, PipelineConfig, PipelineError};
use watershed_mosaic::raster::{GeoTransform, GridRaster, MosaicSpec, MosaicStore, PixelWindow, RasterSource, ResampleMethod};
use watershed_mosaic::stitch::StitchError;

// =============================================================================
// Test Helpers
// =============================================================================

const OUTPUT: &str = "sed_export.wgr";

/// Writes a copy of the clipped DEM with every valid pixel set to a value
/// derived from the job id.
struct StampModel {
    fail_on: Option<String>,
    delay: Duration,
    /// Extra output written as bytes no raster reader accepts
    corrupt_output: Option<String>,
}

impl StampModel {
    fn new() -> Self {
        Self {
            fail_on: None,
            delay: Duration::ZERO,
            corrupt_output: None,
        }
    }

    fn failing_on(job_id: &str) -> Self {
        Self {
            fail_on: Some(job_id.to_string()),
            ..Self::new()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_corrupt_output(mut self, file_name: &str) -> Self {
        self.corrupt_output = Some(file_name.to_string());
        self
    }
}

fn stamp(job_id: &str) -> f32 {
    (job_id.bytes().map(u32::from).sum::<u32>() % 97) as f32 + 1.0
}

impl ExternalModel for StampModel {
    fn name(&self) -> &str {
        "stamp"
    }

    async fn run(&self, invocation: &ModelInvocation) -> Result<(), ModelError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.as_deref() == Some(invocation.job_id.as_str()) {
            return Err(ModelError::Other("no outlet found".into()));
        }
        let mut dem = GridRaster::read(&invocation.inputs["dem"]).map_err(|e| ModelError::Other(e.to_string()))?;
        let value = stamp(&invocation.job_id);
        let nodata = dem.nodata;
        for v in dem.data.iter_mut() {
            if *v as f64 != nodata {
                *v = value;
            }
        }
        if let Some(name) = &self.corrupt_output {
            std::fs::write(invocation.workspace_dir.join(name), b"not a raster")
                .map_err(|e| ModelError::Other(e.to_string()))?;
        }
        dem.write(&invocation.workspace_dir.join(OUTPUT))
            .map_err(|e| ModelError::Other(e.to_string()))
    }
}

fn rect(id: i64, x0: f64, y0: f64, x1: f64, y1: f64) -> serde_json::Value {
    json!({
        "type": "Feature",
        "id": id,
        "properties": {},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
        }
    })
}

fn write_collection(dir: &Path, name: &str, features: Vec<serde_json::Value>) {
    std::fs::create_dir_all(dir).unwrap();
    let fc = json!({ "type": "FeatureCollection", "features": features });
    std::fs::write(dir.join(format!("{}.geojson", name)), fc.to_string()).unwrap();
}

/// Three watersheds in UTM zone 32N with areas 0.5, 1.5 and 0.3 degrees².
fn three_watersheds(dir: &Path) {
    write_collection(
        dir,
        "basins",
        vec![
            rect(1, 8.2, 44.2, 8.7, 45.2),
            rect(2, 10.0, 45.0, 11.5, 46.0),
            rect(3, 9.0, 44.5, 9.3, 45.5),
        ],
    );
}

/// Geographic DEM over lon 6..14, lat 42..48 at 0.1 degrees.
fn write_dem(path: &Path) {
    let (w, h) = (80, 60);
    let dem = GridRaster {
        width: w,
        height: h,
        transform: GeoTransform::new(6.0, 0.1, 48.0, -0.1),
        nodata: -9999.0,
        crs: Crs::Geographic,
        data: (0..w * h).map(|i| (i % 50) as f32).collect(),
    };
    dem.write(path).unwrap();
}

fn config(root: &Path) -> PipelineConfig {
    let watersheds = root.join("watersheds");
    let dem = root.join("dem.wgr");
    if !dem.exists() {
        write_dem(&dem);
    }
    PipelineConfig::new(root.join("run"), watersheds)
        .with_input(InputRaster::new("dem", dem, ResampleMethod::Nearest))
        .with_output(OUTPUT, "sed_export")
        .with_mosaic_spec(MosaicSpec::new(BoundingBox::new(6.0, 42.0, 14.0, 48.0), 0.1, -1.0, 16))
        .with_target_pixel_size(10_000.0)
        .with_area_weighted(false)
        .with_max_parallel(2)
}

fn mosaic_pixels(config: &PipelineConfig) -> Vec<f32> {
    let store = MosaicStore::open(&config.mosaic_path("sed_export")).unwrap();
    store.read_window(PixelWindow::new(0, 0, 80, 60)).unwrap()
}

fn job_workspace(config: &PipelineConfig, job_id: &str) -> PathBuf {
    config.workspace.join("jobs").join(job_id)
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_stitches_every_job_and_reclaims_workspaces() {
    let dir = TempDir::new().unwrap();
    three_watersheds(&dir.path().join("watersheds"));
    let config = config(dir.path());

    let summary = Pipeline::new(config.clone(), StampModel::new()).run().await.unwrap();

    assert_eq!(summary.jobs_total, 2);
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.mosaics_created, 1);
    assert_eq!(summary.reclaim.reclaimed, 2);
    assert_eq!(summary.reclaim.outstanding, 0);
    assert_eq!(summary.stitch.len(), 1);
    assert_eq!(summary.stitch[0].outputs, 2);

    let ledger = Ledger::in_workspace(&config.workspace);
    for job_id in ["basins_2", "basins_8_44_32632_0"] {
        assert!(ledger.is_complete(job_id), "{} should be complete", job_id);
        assert!(!job_workspace(&config, job_id).exists(), "{} workspace should be reclaimed", job_id);
    }

    let pixels = mosaic_pixels(&config);
    let values: HashSet<u32> = pixels.iter().filter(|v| **v != -1.0).map(|v| *v as u32).collect();
    let expected: HashSet<u32> = [stamp("basins_2") as u32, stamp("basins_8_44_32632_0") as u32]
        .into_iter()
        .collect();
    assert_eq!(values, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mosaic_is_independent_of_completion_order() {
    let serial = TempDir::new().unwrap();
    three_watersheds(&serial.path().join("watersheds"));
    let serial_config = config(serial.path()).with_max_parallel(1);
    Pipeline::new(serial_config.clone(), StampModel::new()).run().await.unwrap();

    let parallel = TempDir::new().unwrap();
    three_watersheds(&parallel.path().join("watersheds"));
    let parallel_config = config(parallel.path()).with_max_parallel(2);
    Pipeline::new(parallel_config.clone(), StampModel::new())
        .run()
        .await
        .unwrap();

    assert_eq!(mosaic_pixels(&serial_config), mosaic_pixels(&parallel_config));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_job_stops_run_and_keeps_workspace() {
    let dir = TempDir::new().unwrap();
    three_watersheds(&dir.path().join("watersheds"));
    let config = config(dir.path()).with_max_parallel(1);

    let model = StampModel::failing_on("basins_2");
    let err = Pipeline::new(config.clone(), model).run().await.unwrap_err();

    match err {
        PipelineError::Executor(ExecutorError::Model { job_id, .. }) => assert_eq!(job_id, "basins_2"),
        other => panic!("unexpected error: {}", other),
    }
    let ledger = Ledger::in_workspace(&config.workspace);
    assert!(!ledger.is_complete("basins_2"));
    assert!(job_workspace(&config, "basins_2").is_dir());
    // Largest job first with one slot: nothing else ran
    assert!(!ledger.is_complete("basins_8_44_32632_0"));
    // Mosaic store exists and is still readable
    assert!(mosaic_pixels(&config).iter().all(|v| *v == -1.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resumed_run_skips_completed_jobs() {
    let dir = TempDir::new().unwrap();
    three_watersheds(&dir.path().join("watersheds"));
    let config = config(dir.path()).with_max_parallel(1);

    // First attempt: the small bucketed job fails after the singleton completed
    let first = Pipeline::new(config.clone(), StampModel::failing_on("basins_8_44_32632_0"))
        .run()
        .await;
    assert!(first.is_err());
    let ledger = Ledger::in_workspace(&config.workspace);
    assert!(ledger.is_complete("basins_2"));

    // Second attempt: partitioning comes from the marker, only the failed job runs
    let model = StampModel::new();
    let summary = Pipeline::new(config.clone(), model).run().await.unwrap();
    assert_eq!(summary.subsets_created, 0);
    assert_eq!(summary.mosaics_created, 0);
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.skipped, 1);
    assert!(ledger.is_complete("basins_8_44_32632_0"));

    // Third attempt: nothing left to do
    let summary = Pipeline::new(config.clone(), StampModel::new()).run().await.unwrap();
    assert_eq!(summary.executed, 0);
    assert_eq!(summary.skipped, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturated_queues_lose_no_outputs() {
    let dir = TempDir::new().unwrap();
    // Twelve disjoint singleton watersheds
    let features = (0..12)
        .map(|i| {
            let x = 6.2 + (i % 4) as f64 * 2.0;
            let y = 42.2 + (i / 4) as f64 * 2.0;
            rect(i, x, y, x + 1.2, y + 1.2)
        })
        .collect();
    write_collection(&dir.path().join("watersheds"), "basins", features);

    let config = config(dir.path())
        .with_max_parallel(8)
        .with_flush_threshold(1)
        .with_partition(PartitionSettings {
            singleton_area: 1.0,
            ..PartitionSettings::default()
        });
    let model = StampModel::new().with_delay(Duration::from_millis(5));
    let summary = Pipeline::new(config.clone(), model).run().await.unwrap();

    assert_eq!(summary.jobs_total, 12);
    assert_eq!(summary.executed, 12);
    assert_eq!(summary.stitch[0].outputs, 12);
    assert_eq!(summary.reclaim.reclaimed, 12);
    let ledger = Ledger::in_workspace(&config.workspace);
    assert_eq!(ledger.completed_count(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_without_outputs_reclaims_directly() {
    let dir = TempDir::new().unwrap();
    three_watersheds(&dir.path().join("watersheds"));
    let mut config = config(dir.path());
    config.outputs.clear();

    let summary = Pipeline::new(config.clone(), StampModel::new()).run().await.unwrap();
    assert!(summary.stitch.is_empty());
    assert_eq!(summary.reclaim.reclaimed, 2);
    assert!(!job_workspace(&config, "basins_2").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_merge_of_one_output_keeps_workspaces() {
    let dir = TempDir::new().unwrap();
    three_watersheds(&dir.path().join("watersheds"));
    let config = config(dir.path()).with_output("n_export.wgr", "n_export");

    let model = StampModel::new().with_corrupt_output("n_export.wgr");
    let err = Pipeline::new(config.clone(), model).run().await.unwrap_err();

    match err {
        PipelineError::Stitch(StitchError::Merge { mosaic, .. }) => assert_eq!(mosaic, "n_export"),
        other => panic!("unexpected error: {}", other),
    }

    // sed_export merged, n_export did not: one of two outputs per job
    let ledger = Ledger::in_workspace(&config.workspace);
    assert_eq!(ledger.completed_count(), 0);
    for job_id in ["basins_2", "basins_8_44_32632_0"] {
        assert!(!ledger.is_complete(job_id), "{} must not be recorded", job_id);
        assert!(job_workspace(&config, job_id).join(OUTPUT).is_file(), "{} workspace must survive", job_id);
    }
    assert!(mosaic_pixels(&config).iter().any(|v| *v != -1.0));
}
