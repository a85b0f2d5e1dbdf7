//! Per-job execution: clip inputs, run the model, hand outputs to stitchers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::{ExecutorError, ExternalModel, ModelInvocation};
use crate::coord::{reproject_bbox, BoundingBox, Crs, AUTHALIC_RADIUS_M};
use crate::partition::JobSpec;
use crate::raster::{clip_to_bbox, open_raster, ResampleMethod, GRID_EXTENSION};
use crate::stitch::{JobOutput, ReclaimMessage, StitchMessage};
use crate::vector::{read_subset, SubsetFile};

/// Directory under the run workspace holding one workspace per job.
pub const JOBS_DIR: &str = "jobs";

/// Directory inside a job workspace holding its clipped inputs.
pub const INPUTS_DIR: &str = "inputs";

/// Length of one degree along the equator on the authalic sphere.
const METRES_PER_DEGREE: f64 = 2.0 * std::f64::consts::PI * AUTHALIC_RADIUS_M / 360.0;

/// Clip margin around the job extent, in output pixels.
const CLIP_MARGIN_PIXELS: f64 = 2.0;

/// A global input raster every job receives a clip of.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRaster {
    /// Logical name passed to the model
    pub name: String,
    /// `.wgr` file or mosaic store directory
    pub path: PathBuf,
    pub method: ResampleMethod,
}

impl InputRaster {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, method: ResampleMethod) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            method,
        }
    }
}

/// Where one named model output goes.
#[derive(Debug, Clone)]
pub struct OutputRoute {
    /// File the model writes inside the job workspace
    pub file_name: String,
    /// Target mosaic name
    pub mosaic: String,
    /// Queue of that mosaic's stitcher
    pub sender: mpsc::Sender<StitchMessage>,
}

/// Result of one successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: String,
    pub outputs: usize,
    pub duration: Duration,
}

/// Runs the model for individual jobs.
///
/// Shared by all job tasks of a run; it holds no per-job state.
pub struct JobExecutor<M: ExternalModel> {
    model: Arc<M>,
    jobs_root: PathBuf,
    inputs: Vec<InputRaster>,
    parameters: BTreeMap<String, f64>,
    target_pixel_size: f64,
    routes: Vec<OutputRoute>,
    reclaim: mpsc::Sender<ReclaimMessage>,
}

impl<M: ExternalModel> JobExecutor<M> {
    /// Creates an executor.
    ///
    /// # Arguments
    ///
    /// * `model` - The model run once per job
    /// * `workspace` - Run workspace; job workspaces go under `jobs/`
    /// * `reclaim` - Reclaimer queue, signalled directly when no outputs
    ///   are routed
    pub fn new(model: Arc<M>, workspace: &Path, reclaim: mpsc::Sender<ReclaimMessage>) -> Self {
        Self {
            model,
            jobs_root: workspace.join(JOBS_DIR),
            inputs: Vec::new(),
            parameters: BTreeMap::new(),
            target_pixel_size: 300.0,
            routes: Vec::new(),
            reclaim,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<InputRaster>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, f64>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_target_pixel_size(mut self, pixel_size: f64) -> Self {
        self.target_pixel_size = pixel_size;
        self
    }

    pub fn with_route(mut self, route: OutputRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Workspace directory of a job.
    pub fn job_workspace(&self, job_id: &str) -> PathBuf {
        self.jobs_root.join(job_id)
    }

    /// Runs one job end to end.
    ///
    /// Returns once every output has been accepted by its stitcher queue,
    /// which may wait for queue space.
    pub async fn execute(&self, job: &JobSpec) -> Result<JobReport, ExecutorError> {
        let started = Instant::now();
        let job_id = job.job_id.as_str();
        let workspace = self.job_workspace(job_id);
        tokio::fs::create_dir_all(workspace.join(INPUTS_DIR))
            .await
            .map_err(|source| ExecutorError::Io {
                path: workspace.join(INPUTS_DIR),
                source,
            })?;

        let subset = self.read_subset(job).await?;
        let target_crs = subset.crs;
        let geographic_bbox = reproject_bbox(&subset.bbox(), target_crs, Crs::Geographic).map_err(|source| {
            ExecutorError::Coord {
                job_id: job_id.to_string(),
                source,
            }
        })?;

        let mut clipped = BTreeMap::new();
        for input in &self.inputs {
            let path = self
                .clip_input(job_id, &workspace, input, &geographic_bbox, target_crs)
                .await?;
            clipped.insert(input.name.clone(), path);
        }

        let invocation = ModelInvocation {
            job_id: job_id.to_string(),
            workspace_dir: workspace.clone(),
            inputs: clipped,
            subset_path: job.subset_path.clone(),
            parameters: self.parameters.clone(),
            target_pixel_size: self.target_pixel_size,
            target_epsg: target_crs.epsg(),
            single_outlet: subset.feature_count() == 1,
        };

        tracing::debug!(
            job_id = %job_id,
            model = %self.model.name(),
            features = subset.feature_count(),
            single_outlet = invocation.single_outlet,
            "Running model"
        );
        self.model
            .run(&invocation)
            .await
            .map_err(|source| ExecutorError::Model {
                job_id: job_id.to_string(),
                source,
            })?;

        let outputs = self.collect_outputs(job_id, &workspace)?;
        for (route, output) in self.routes.iter().zip(outputs) {
            route
                .sender
                .send(StitchMessage::Output(output))
                .await
                .map_err(|_| ExecutorError::QueueClosed {
                    job_id: job_id.to_string(),
                    queue: route.mosaic.clone(),
                })?;
        }
        if self.routes.is_empty() {
            self.reclaim
                .send(ReclaimMessage::Stitched {
                    job_id: job_id.to_string(),
                    workspace,
                })
                .await
                .map_err(|_| ExecutorError::QueueClosed {
                    job_id: job_id.to_string(),
                    queue: "reclaimer".to_string(),
                })?;
        }

        let report = JobReport {
            job_id: job_id.to_string(),
            outputs: self.routes.len(),
            duration: started.elapsed(),
        };
        tracing::info!(
            job_id = %job_id,
            outputs = report.outputs,
            elapsed_ms = report.duration.as_millis() as u64,
            "Job complete"
        );
        Ok(report)
    }

    async fn read_subset(&self, job: &JobSpec) -> Result<SubsetFile, ExecutorError> {
        let path = job.subset_path.clone();
        tokio::task::spawn_blocking(move || read_subset(&path))
            .await
            .map_err(|e| ExecutorError::Join(e.to_string()))?
            .map_err(|source| ExecutorError::Vector {
                job_id: job.job_id.clone(),
                source,
            })
    }

    /// Clips one global input to the job extent plus a small margin.
    /// An existing clip from an interrupted earlier attempt is reused.
    async fn clip_input(
        &self,
        job_id: &str,
        workspace: &Path,
        input: &InputRaster,
        geographic_bbox: &BoundingBox,
        target_crs: Crs,
    ) -> Result<PathBuf, ExecutorError> {
        let target = workspace
            .join(INPUTS_DIR)
            .join(format!("{}.{}", input.name, GRID_EXTENSION));
        if target.is_file() {
            return Ok(target);
        }

        let source_path = input.path.clone();
        let out = target.clone();
        let method = input.method;
        let bbox = *geographic_bbox;
        let target_pixel_size = self.target_pixel_size;
        let job = job_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), ExecutorError> {
            let raster_err = |source| ExecutorError::Raster {
                job_id: job.clone(),
                source,
            };
            let source = open_raster(&source_path).map_err(raster_err)?;
            let info = source.info();
            let pixel_size = clip_pixel_size(target_pixel_size, target_crs, info.crs);
            let mut clip_bbox = reproject_bbox(&bbox, Crs::Geographic, info.crs).map_err(|source| {
                ExecutorError::Coord {
                    job_id: job.clone(),
                    source,
                }
            })?;
            let margin = CLIP_MARGIN_PIXELS * pixel_size.max(info.transform.pixel_width.abs());
            clip_bbox = BoundingBox::new(
                clip_bbox.min_x - margin,
                clip_bbox.min_y - margin,
                clip_bbox.max_x + margin,
                clip_bbox.max_y + margin,
            );
            clip_to_bbox(source.as_ref(), &clip_bbox, Some(pixel_size), method, &out).map_err(raster_err)?;
            Ok(())
        })
        .await
        .map_err(|e| ExecutorError::Join(e.to_string()))??;

        Ok(target)
    }

    fn collect_outputs(&self, job_id: &str, workspace: &Path) -> Result<Vec<JobOutput>, ExecutorError> {
        self.routes
            .iter()
            .map(|route| {
                let path = workspace.join(&route.file_name);
                if path.is_file() {
                    Ok(JobOutput::new(job_id, workspace, path))
                } else {
                    Err(ExecutorError::MissingOutput {
                        job_id: job_id.to_string(),
                        path,
                    })
                }
            })
            .collect()
    }
}

/// Target pixel size expressed in the units of the source CRS.
fn clip_pixel_size(target_pixel_size: f64, target_crs: Crs, source_crs: Crs) -> f64 {
    match (target_crs.is_geographic(), source_crs.is_geographic()) {
        (false, true) => target_pixel_size / METRES_PER_DEGREE,
        (true, false) => target_pixel_size * METRES_PER_DEGREE,
        _ => target_pixel_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ModelError;
    use crate::geometry::{Feature, MultiPolygon, Polygon};
    use crate::raster::{GeoTransform, GridRaster};
    use crate::vector::write_subset;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes a constant raster per output over the clipped `dem` extent.
    struct FillModel {
        outputs: Vec<String>,
        seen: Mutex<Vec<ModelInvocation>>,
    }

    impl ExternalModel for FillModel {
        fn name(&self) -> &str {
            "fill"
        }

        async fn run(&self, invocation: &ModelInvocation) -> Result<(), ModelError> {
            self.seen.lock().unwrap().push(invocation.clone());
            let dem = GridRaster::read(&invocation.inputs["dem"]).map_err(|e| ModelError::Other(e.to_string()))?;
            for name in &self.outputs {
                dem.write(&invocation.workspace_dir.join(name))
                    .map_err(|e| ModelError::Other(e.to_string()))?;
            }
            Ok(())
        }
    }

    struct FailingModel;

    impl ExternalModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(&self, _invocation: &ModelInvocation) -> Result<(), ModelError> {
            Err(ModelError::Other("no outlet found".into()))
        }
    }

    fn square(id: i64, x: f64, y: f64, size: f64) -> Feature {
        Feature::new(
            id,
            "basins",
            MultiPolygon(vec![Polygon::new(
                vec![[x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]],
                vec![],
            )]),
        )
    }

    fn setup(dir: &Path, features: &[Feature]) -> (JobSpec, InputRaster) {
        let dem = GridRaster {
            width: 20,
            height: 20,
            transform: GeoTransform::new(0.0, 0.5, 10.0, -0.5),
            nodata: -9999.0,
            crs: Crs::Geographic,
            data: (0..400).map(|v| v as f32).collect(),
        };
        let dem_path = dir.join("dem.wgr");
        dem.write(&dem_path).unwrap();

        let subset_path = dir.join("subsets/basins_8_4_4326_0_a2.000000.geojson");
        write_subset(&subset_path, "basins_8_4_4326_0", "basins", Crs::Geographic, features).unwrap();
        let job = JobSpec {
            job_id: "basins_8_4_4326_0".into(),
            area: 2.0,
            subset_path,
        };
        (job, InputRaster::new("dem", dem_path, ResampleMethod::Nearest))
    }

    #[test]
    fn test_clip_pixel_size_converts_units() {
        let utm = Crs::Utm { zone: 32, north: true };
        let deg = clip_pixel_size(METRES_PER_DEGREE, utm, Crs::Geographic);
        assert!((deg - 1.0).abs() < 1e-12);
        assert_eq!(clip_pixel_size(0.5, Crs::Geographic, Crs::Geographic), 0.5);
    }

    #[tokio::test]
    async fn test_execute_routes_outputs_to_stitchers() {
        let dir = TempDir::new().unwrap();
        let (job, dem) = setup(dir.path(), &[square(1, 2.0, 2.0, 1.0), square(2, 4.0, 2.0, 1.0)]);
        let model = Arc::new(FillModel {
            outputs: vec!["sed_export.wgr".into()],
            seen: Mutex::new(Vec::new()),
        });
        let (stitch_tx, mut stitch_rx) = mpsc::channel(4);
        let (reclaim_tx, mut reclaim_rx) = mpsc::channel(4);
        let executor = JobExecutor::new(Arc::clone(&model), dir.path(), reclaim_tx)
            .with_inputs(vec![dem])
            .with_target_pixel_size(0.5)
            .with_route(OutputRoute {
                file_name: "sed_export.wgr".into(),
                mosaic: "sed".into(),
                sender: stitch_tx,
            });

        let report = executor.execute(&job).await.unwrap();
        assert_eq!(report.outputs, 1);

        let ws = dir.path().join("jobs/basins_8_4_4326_0");
        match stitch_rx.recv().await {
            Some(StitchMessage::Output(output)) => {
                assert_eq!(output.path, ws.join("sed_export.wgr"));
                assert_eq!(output.workspace, ws);
                assert_eq!(output.band, 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(reclaim_rx.try_recv().is_err());

        let seen = model.seen.lock().unwrap();
        assert!(!seen[0].single_outlet);
        assert_eq!(seen[0].target_epsg, 4326);
        assert_eq!(seen[0].inputs["dem"], ws.join("inputs/dem.wgr"));

        // Extent 2..5 x 2..3 plus a one-degree margin, on the 0.5 grid
        let clipped = GridRaster::read(&ws.join("inputs/dem.wgr")).unwrap();
        assert_eq!(clipped.transform.origin_x, 1.0);
        assert_eq!(clipped.width, 10);
    }

    #[tokio::test]
    async fn test_single_feature_sets_single_outlet() {
        let dir = TempDir::new().unwrap();
        let (job, dem) = setup(dir.path(), &[square(7, 2.0, 2.0, 1.0)]);
        let model = Arc::new(FillModel {
            outputs: vec![],
            seen: Mutex::new(Vec::new()),
        });
        let (reclaim_tx, mut reclaim_rx) = mpsc::channel(4);
        let executor = JobExecutor::new(Arc::clone(&model), dir.path(), reclaim_tx).with_inputs(vec![dem]);

        executor.execute(&job).await.unwrap();
        assert!(model.seen.lock().unwrap()[0].single_outlet);
        // Without routes the workspace goes straight to the reclaimer
        assert_eq!(
            reclaim_rx.recv().await,
            Some(ReclaimMessage::Stitched {
                job_id: "basins_8_4_4326_0".into(),
                workspace: dir.path().join("jobs/basins_8_4_4326_0"),
            })
        );
    }

    #[tokio::test]
    async fn test_missing_output_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (job, dem) = setup(dir.path(), &[square(1, 2.0, 2.0, 1.0)]);
        let model = Arc::new(FillModel {
            outputs: vec!["other.wgr".into()],
            seen: Mutex::new(Vec::new()),
        });
        let (stitch_tx, _stitch_rx) = mpsc::channel(4);
        let (reclaim_tx, _reclaim_rx) = mpsc::channel(4);
        let executor = JobExecutor::new(model, dir.path(), reclaim_tx)
            .with_inputs(vec![dem])
            .with_route(OutputRoute {
                file_name: "sed_export.wgr".into(),
                mosaic: "sed".into(),
                sender: stitch_tx,
            });

        assert!(matches!(
            executor.execute(&job).await,
            Err(ExecutorError::MissingOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_model_failure_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let (job, dem) = setup(dir.path(), &[square(1, 2.0, 2.0, 1.0)]);
        let (stitch_tx, mut stitch_rx) = mpsc::channel(4);
        let (reclaim_tx, mut reclaim_rx) = mpsc::channel(4);
        let executor = JobExecutor::new(Arc::new(FailingModel), dir.path(), reclaim_tx)
            .with_inputs(vec![dem])
            .with_route(OutputRoute {
                file_name: "sed_export.wgr".into(),
                mosaic: "sed".into(),
                sender: stitch_tx,
            });

        let err = executor.execute(&job).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Model { ref job_id, .. } if job_id == "basins_8_4_4326_0"));
        drop(executor);
        assert!(stitch_rx.recv().await.is_none());
        assert!(reclaim_rx.recv().await.is_none());
        assert!(dir.path().join("jobs/basins_8_4_4326_0").is_dir());
    }
}
