//! The external per-job model.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};

use super::ModelError;

/// Name of the configuration file written into each job workspace for
/// command-line models.
pub const MODEL_CONFIG_FILE: &str = "model_config.json";

/// Trailing bytes of stderr kept in a failure report.
const STDERR_TAIL_BYTES: usize = 4096;

/// Everything a model needs to process one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInvocation {
    pub job_id: String,
    /// Directory the model writes its outputs into
    pub workspace_dir: PathBuf,
    /// Clipped input rasters by logical name
    pub inputs: BTreeMap<String, PathBuf>,
    /// Subset vector holding the job's features
    pub subset_path: PathBuf,
    /// Thresholds and calibration constants, passed through verbatim
    pub parameters: BTreeMap<String, f64>,
    /// Pixel size in the target projection's units
    pub target_pixel_size: f64,
    /// EPSG code of the target projection
    pub target_epsg: u32,
    /// The job's domain has exactly one feature
    pub single_outlet: bool,
}

/// A model run once per job.
///
/// Implementations write their named output rasters into
/// `invocation.workspace_dir` and return an error on unrecoverable failure.
pub trait ExternalModel: Send + Sync + 'static {
    /// Name for logging.
    fn name(&self) -> &str;

    fn run(&self, invocation: &ModelInvocation) -> impl Future<Output = Result<(), ModelError>> + Send;
}

/// Runs a program as the model.
///
/// The invocation is written to `model_config.json` in the job workspace,
/// and the program is started in that directory with the configured
/// arguments followed by the path of that file.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: String,
    args: Vec<String>,
}

impl CommandModel {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ExternalModel for CommandModel {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(&self, invocation: &ModelInvocation) -> Result<(), ModelError> {
        let config_path = invocation.workspace_dir.join(MODEL_CONFIG_FILE);
        let json = serde_json::to_vec_pretty(invocation).map_err(|e| ModelError::Other(e.to_string()))?;
        tokio::fs::write(&config_path, json)
            .await
            .map_err(|source| ModelError::Io {
                path: config_path.clone(),
                source,
            })?;

        tracing::debug!(
            job_id = %invocation.job_id,
            program = %self.program,
            "Starting model"
        );
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(&config_path)
            .current_dir(&invocation.workspace_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ModelError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
        let tail = stderr
            .char_indices()
            .find(|(i, _)| *i >= tail_start)
            .map(|(i, _)| &stderr[i..])
            .unwrap_or("");
        Err(ModelError::Failed {
            program: self.program.clone(),
            status: output.status.to_string(),
            stderr: tail.trim().to_string(),
        })
    }
}
