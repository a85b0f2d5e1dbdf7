//! Deletes job workspaces once every output has been stitched.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use super::{ReclaimMessage, StitchError};
use crate::executor::Ledger;

/// Totals reported by a stopped reclaimer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub signals: usize,
    pub reclaimed: usize,
    /// Workspaces still waiting for outputs when the reclaimer stopped
    pub outstanding: usize,
}

/// Single consumer of the shared reclaim queue.
///
/// Counts `Stitched` signals per workspace and removes a workspace once it
/// has received one signal per configured output name. The count map is
/// owned by this worker alone.
pub struct WorkspaceReclaimer {
    rx: mpsc::Receiver<ReclaimMessage>,
    required: usize,
    counts: HashMap<PathBuf, usize>,
    ledger: Option<Ledger>,
}

impl WorkspaceReclaimer {
    /// Creates a reclaimer expecting `outputs_per_job` signals per
    /// workspace. Zero is treated as one.
    pub fn new(rx: mpsc::Receiver<ReclaimMessage>, outputs_per_job: usize) -> Self {
        Self {
            rx,
            required: outputs_per_job.max(1),
            counts: HashMap::new(),
            ledger: None,
        }
    }

    /// Records each reclaimed workspace's job as complete.
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Runs until `Finish` arrives or all senders are dropped.
    pub async fn run(mut self) -> Result<ReclaimReport, StitchError> {
        tracing::debug!(required = self.required, "Reclaimer starting");
        let mut report = ReclaimReport::default();

        while let Some(ReclaimMessage::Stitched { job_id, workspace }) = self.rx.recv().await {
            report.signals += 1;
            let count = self.counts.entry(workspace.clone()).or_insert(0);
            *count += 1;
            if *count < self.required {
                continue;
            }
            self.counts.remove(&workspace);
            self.reclaim(&job_id, workspace).await?;
            report.reclaimed += 1;
        }

        report.outstanding = self.counts.len();
        if report.outstanding > 0 {
            tracing::warn!(
                outstanding = report.outstanding,
                "Reclaimer stopped with partially stitched workspaces"
            );
        }
        tracing::debug!(reclaimed = report.reclaimed, "Reclaimer stopped");
        Ok(report)
    }

    async fn reclaim(&self, job_id: &str, workspace: PathBuf) -> Result<(), StitchError> {
        let path = workspace.clone();
        tokio::task::spawn_blocking(move || remove_workspace(&path))
            .await
            .map_err(|e| StitchError::Join(e.to_string()))?
            .map_err(|source| StitchError::Reclaim {
                path: workspace.clone(),
                source,
            })?;

        if let Some(ledger) = &self.ledger {
            ledger
                .mark_complete(job_id)
                .map_err(|source| StitchError::Ledger {
                    job_id: job_id.to_string(),
                    source,
                })?;
        }
        tracing::debug!(job_id = %job_id, "Workspace reclaimed");
        Ok(())
    }
}

fn remove_workspace(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
