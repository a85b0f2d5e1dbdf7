//! Completed-job ledger.
//!
//! One `<job_id>.done` file per job whose outputs have all been stitched and
//! whose workspace has been reclaimed. The file holds the completion time;
//! only its existence matters.

use std::path::{Path, PathBuf};

use super::ExecutorError;

/// Ledger directory name under the run workspace.
pub const LEDGER_DIR: &str = "completed";

/// Extension of ledger entries.
pub const LEDGER_EXTENSION: &str = "done";

#[derive(Debug, Clone)]
pub struct Ledger {
    dir: PathBuf,
}

impl Ledger {
    /// Ledger stored in `<workspace>/completed`.
    pub fn in_workspace(workspace: &Path) -> Self {
        Self::new(workspace.join(LEDGER_DIR))
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", job_id, LEDGER_EXTENSION))
    }

    pub fn is_complete(&self, job_id: &str) -> bool {
        self.entry_path(job_id).is_file()
    }

    /// Records a job as complete.
    pub fn mark_complete(&self, job_id: &str) -> Result<(), ExecutorError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ExecutorError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.entry_path(job_id);
        std::fs::write(&path, chrono::Utc::now().to_rfc3339())
            .map_err(|source| ExecutorError::Io { path, source })
    }

    /// Number of completed jobs on record.
    pub fn completed_count(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| {
                        e.path()
                            .extension()
                            .map(|ext| ext == LEDGER_EXTENSION)
                            .unwrap_or(false)
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}
