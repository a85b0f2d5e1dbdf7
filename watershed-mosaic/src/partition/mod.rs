//! Watershed partitioning.
//!
//! Turns named feature collections into an ordered list of jobs, each
//! materialized once as a subset file reprojected into its UTM zone.
//!
//! ```text
//! collections ──► assign_buckets ──► collision check ──► materialize ──► marker
//!                 (per collection)                       (missing only)
//! ```
//!
//! Partitioning is idempotent: subset files are only written if absent, and
//! once the completion marker exists later runs list the subset directory
//! instead of recomputing anything.

mod bucket;
mod materialize;

pub use bucket::{assign_buckets, Bucket, BucketKey, BucketRecord};
pub use materialize::{
    list_jobs, parse_subset_file_name, subset_file_name, PartitionOutcome, Partitioner, PARTITION_MARKER,
};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::coord::CoordError;
use crate::vector::VectorError;

/// Default grid cell size, in degrees, for bucketing small features.
pub const DEFAULT_DEGREE_SEPARATION: u32 = 4;

/// Default area above which a feature becomes its own job.
pub const DEFAULT_SINGLETON_AREA: f64 = 1.0;

/// Default cap on features per bucketed job.
pub const DEFAULT_MAX_FEATURES_PER_JOB: usize = 1000;

/// Errors raised while partitioning. All of them are integrity errors and
/// abort the run before any job is dispatched.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Two buckets produced the same job id
    #[error("job id collision: '{job_id}' computed twice")]
    JobIdCollision { job_id: String },

    /// The explicit subset names a feature that does not exist
    #[error("feature {fid} not found in collection '{collection}'")]
    UnknownFeature { collection: String, fid: i64 },

    /// The explicit subset could not be parsed
    #[error("invalid subset entry '{0}', expected collection:fid")]
    InvalidSubset(String),

    /// Filesystem error on the subset directory or marker
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Vector read/write or reprojection failure
    #[error(transparent)]
    Vector(#[from] VectorError),

    /// Centroid transform failure
    #[error(transparent)]
    Coord(#[from] CoordError),
}

/// Tuning for the bucketing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSettings {
    /// Grid cell size in degrees
    pub degree_separation: u32,
    /// Features with a larger area become singleton jobs
    pub singleton_area: f64,
    /// A grid cell opens a new sub-bucket once the current one holds this many
    pub max_features_per_job: usize,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self {
            degree_separation: DEFAULT_DEGREE_SEPARATION,
            singleton_area: DEFAULT_SINGLETON_AREA,
            max_features_per_job: DEFAULT_MAX_FEATURES_PER_JOB,
        }
    }
}

/// An explicit set of `(collection, feature id)` pairs to process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSubset(BTreeMap<String, BTreeSet<i64>>);

impl FeatureSubset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: impl Into<String>, fid: i64) {
        self.0.entry(collection.into()).or_default().insert(fid);
    }

    pub fn with(mut self, collection: impl Into<String>, fid: i64) -> Self {
        self.insert(collection, fid);
        self
    }

    /// Parses `collection:fid` pairs separated by commas.
    pub fn parse(s: &str) -> Result<Self, PartitionError> {
        let mut subset = Self::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (collection, fid) = entry
                .rsplit_once(':')
                .ok_or_else(|| PartitionError::InvalidSubset(entry.to_string()))?;
            let fid = fid
                .trim()
                .parse::<i64>()
                .map_err(|_| PartitionError::InvalidSubset(entry.to_string()))?;
            let collection = collection.trim();
            if collection.is_empty() {
                return Err(PartitionError::InvalidSubset(entry.to_string()));
            }
            subset.insert(collection, fid);
        }
        Ok(subset)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn ids(&self, collection: &str) -> Option<&BTreeSet<i64>> {
        self.0.get(collection)
    }
}

impl fmt::Display for FeatureSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .0
            .iter()
            .flat_map(|(c, ids)| ids.iter().map(move |id| format!("{}:{}", c, id)))
            .collect();
        write!(f, "{}", entries.join(","))
    }
}

/// A materialized job, as handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub job_id: String,
    /// Aggregate feature area, in input units
    pub area: f64,
    /// Subset file holding the job's reprojected features
    pub subset_path: PathBuf,
}

/// Sorts jobs into dispatch order: area descending, ties by job id.
pub fn sort_dispatch_order(jobs: &mut [JobSpec]) {
    jobs.sort_by(|a, b| b.area.total_cmp(&a.area).then_with(|| a.job_id.cmp(&b.job_id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_parse() {
        let subset = FeatureSubset::parse("hybas_eu:12, hybas_af:3,hybas_eu:7").unwrap();
        assert_eq!(subset.collections().collect::<Vec<_>>(), vec!["hybas_af", "hybas_eu"]);
        assert_eq!(
            subset.ids("hybas_eu").unwrap().iter().copied().collect::<Vec<_>>(),
            vec![7, 12]
        );
        assert_eq!(subset.to_string(), "hybas_af:3,hybas_eu:7,hybas_eu:12");
        assert!(FeatureSubset::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_subset_parse_errors() {
        assert!(matches!(
            FeatureSubset::parse("hybas_eu"),
            Err(PartitionError::InvalidSubset(_))
        ));
        assert!(FeatureSubset::parse("hybas_eu:x").is_err());
        assert!(FeatureSubset::parse(":4").is_err());
    }

    #[test]
    fn test_dispatch_order() {
        let job = |id: &str, area: f64| JobSpec {
            job_id: id.to_string(),
            area,
            subset_path: PathBuf::from(format!("{}.geojson", id)),
        };
        let mut jobs = vec![job("b", 0.8), job("c", 1.5), job("a", 0.8), job("d", 0.1)];
        sort_dispatch_order(&mut jobs);
        let order: Vec<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b", "d"]);
    }
}
