//! Subset materialization, the completion marker and job listing.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use super::bucket::{assign_buckets, Bucket};
use super::{sort_dispatch_order, FeatureSubset, JobSpec, PartitionError, PartitionSettings};
use crate::vector::{reproject_collection, write_subset, Collection, SpatialUnitSource, GEOJSON_EXTENSION};

/// Marker file written into the subset directory once partitioning is done.
pub const PARTITION_MARKER: &str = "partition.complete";

/// Subset file name for a job: `{job_id}_a{area}.geojson`, area with six
/// decimals.
pub fn subset_file_name(job_id: &str, area: f64) -> String {
    format!("{}_a{:.6}.{}", job_id, area, GEOJSON_EXTENSION)
}

/// Splits a subset file name back into job id and area.
pub fn parse_subset_file_name(name: &str) -> Option<(String, f64)> {
    let stem = name.strip_suffix(&format!(".{}", GEOJSON_EXTENSION))?;
    let (job_id, area) = stem.rsplit_once("_a")?;
    if job_id.is_empty() {
        return None;
    }
    let area = area.parse::<f64>().ok()?;
    Some((job_id.to_string(), area))
}

/// Lists the subset files in a directory as jobs in dispatch order.
///
/// Files whose names do not parse are skipped with a warning.
pub fn list_jobs(subset_dir: &Path) -> Result<Vec<JobSpec>, PartitionError> {
    let entries = match std::fs::read_dir(subset_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PartitionError::Io {
                path: subset_dir.to_path_buf(),
                source,
            })
        }
    };

    let mut jobs = Vec::new();
    for path in entries.flatten().map(|e| e.path()).filter(|p| p.is_file()) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(GEOJSON_EXTENSION) {
            continue;
        }
        match parse_subset_file_name(name) {
            Some((job_id, area)) => jobs.push(JobSpec {
                job_id,
                area,
                subset_path: path.clone(),
            }),
            None => tracing::warn!(file = %path.display(), "Ignoring unrecognised subset file"),
        }
    }
    sort_dispatch_order(&mut jobs);
    Ok(jobs)
}

/// Result of a partitioning pass.
#[derive(Debug, Clone, Default)]
pub struct PartitionOutcome {
    /// Jobs in dispatch order
    pub jobs: Vec<JobSpec>,
    /// Subset files written by this pass
    pub created: usize,
    /// Subset files that already existed
    pub reused: usize,
    /// True if the marker short-circuited the pass
    pub from_marker: bool,
}

/// Drives partitioning of every collection of a source into a subset
/// directory.
pub struct Partitioner {
    source: Arc<dyn SpatialUnitSource>,
    settings: PartitionSettings,
    subset: Option<FeatureSubset>,
    subset_dir: PathBuf,
}

impl Partitioner {
    pub fn new(source: Arc<dyn SpatialUnitSource>, subset_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            settings: PartitionSettings::default(),
            subset: None,
            subset_dir: subset_dir.into(),
        }
    }

    pub fn with_settings(mut self, settings: PartitionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Restricts partitioning to an explicit feature subset. An empty subset
    /// means no restriction.
    pub fn with_subset(mut self, subset: FeatureSubset) -> Self {
        self.subset = (!subset.is_empty()).then_some(subset);
        self
    }

    pub fn subset_dir(&self) -> &Path {
        &self.subset_dir
    }

    pub fn marker_path(&self) -> PathBuf {
        self.subset_dir.join(PARTITION_MARKER)
    }

    /// Runs the partitioning pass, or lists existing subsets if the marker
    /// is present.
    pub fn run(&self) -> Result<PartitionOutcome, PartitionError> {
        let marker = self.marker_path();
        if marker.is_file() {
            let jobs = list_jobs(&self.subset_dir)?;
            tracing::info!(
                jobs = jobs.len(),
                marker = %marker.display(),
                "Partitioning already complete, reusing subset files"
            );
            return Ok(PartitionOutcome {
                reused: jobs.len(),
                jobs,
                created: 0,
                from_marker: true,
            });
        }

        std::fs::create_dir_all(&self.subset_dir).map_err(|source| PartitionError::Io {
            path: self.subset_dir.clone(),
            source,
        })?;

        let names: Vec<String> = match &self.subset {
            Some(subset) => subset.collections().map(str::to_string).collect(),
            None => self.source.collection_names()?,
        };

        let mut outcome = PartitionOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();
        for name in &names {
            let collection = self.source.read_collection(name)?;
            let explicit = self.subset.as_ref().and_then(|s| s.ids(name));
            let buckets = assign_buckets(&collection, &self.settings, explicit)?;

            for bucket in &buckets {
                let job_id = bucket.job_id();
                if !seen.insert(job_id.clone()) {
                    tracing::error!(job_id = %job_id, collection = %name, "Job id collision");
                    return Err(PartitionError::JobIdCollision { job_id });
                }
            }

            let (created, reused, jobs) = self.materialize(&collection, &buckets)?;
            tracing::info!(
                collection = %name,
                features = collection.len(),
                jobs = jobs.len(),
                created,
                reused,
                "Partitioned collection"
            );
            outcome.created += created;
            outcome.reused += reused;
            outcome.jobs.extend(jobs);
        }

        std::fs::write(&marker, chrono::Utc::now().to_rfc3339()).map_err(|source| PartitionError::Io {
            path: marker.clone(),
            source,
        })?;
        sort_dispatch_order(&mut outcome.jobs);
        Ok(outcome)
    }

    /// Writes the subset file of every bucket that does not have one yet.
    fn materialize(
        &self,
        collection: &Collection,
        buckets: &[Bucket],
    ) -> Result<(usize, usize, Vec<JobSpec>), PartitionError> {
        let by_id: HashMap<i64, usize> = collection
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id, i))
            .collect();

        let results: Vec<(JobSpec, bool)> = buckets
            .par_iter()
            .map(|bucket| -> Result<(JobSpec, bool), PartitionError> {
                let job_id = bucket.job_id();
                let path = self
                    .subset_dir
                    .join(subset_file_name(&job_id, bucket.record.area));
                let job = JobSpec {
                    job_id: job_id.clone(),
                    area: bucket.record.area,
                    subset_path: path.clone(),
                };
                if path.is_file() {
                    return Ok((job, false));
                }

                let features: Vec<_> = bucket
                    .record
                    .fids
                    .iter()
                    .filter_map(|fid| by_id.get(fid).map(|i| collection.features[*i].clone()))
                    .collect();
                let projected = reproject_collection(&job_id, &features, collection.crs, bucket.record.crs)?;
                write_subset(&path, &job_id, &collection.name, bucket.record.crs, &projected)?;
                tracing::debug!(job_id = %job_id, features = projected.len(), "Wrote subset");
                Ok((job, true))
            })
            .collect::<Result<_, _>>()?;

        let created = results.iter().filter(|(_, created)| *created).count();
        let reused = results.len() - created;
        Ok((created, reused, results.into_iter().map(|(job, _)| job).collect()))
    }
}
