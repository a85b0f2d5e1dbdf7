//! Greedy spatial bucketing of features into jobs.
//!
//! Features larger than the singleton threshold (or explicitly requested)
//! become jobs of their own. Everything else is grouped by the grid cell its
//! centroid falls in, combined with its UTM zone, and a cell is split into
//! numbered sub-buckets whenever the current one is full.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use rayon::prelude::*;

use super::{PartitionError, PartitionSettings};
use crate::coord::{transform_point, utm_zone_for, BoundingBox, Crs};
use crate::vector::Collection;

/// Identity of a job before it is materialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    /// One large (or explicitly requested) feature
    Singleton { collection: String, fid: i64 },
    /// Small features sharing a grid cell and UTM zone
    Grid {
        collection: String,
        /// Grid cell origin, snapped down to the degree separation
        cell_x: i64,
        cell_y: i64,
        /// EPSG code of the cell's UTM zone
        epsg: u32,
        /// Sub-bucket index within the cell
        sub: u32,
    },
}

impl BucketKey {
    /// The job id this bucket materializes as.
    pub fn job_id(&self) -> String {
        self.to_string()
    }

    pub fn collection(&self) -> &str {
        match self {
            BucketKey::Singleton { collection, .. } | BucketKey::Grid { collection, .. } => collection,
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, BucketKey::Singleton { .. })
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Singleton { collection, fid } => write!(f, "{}_{}", collection, fid),
            BucketKey::Grid {
                collection,
                cell_x,
                cell_y,
                epsg,
                sub,
            } => write!(f, "{}_{}_{}_{}_{}", collection, cell_x, cell_y, epsg, sub),
        }
    }
}

/// Accumulated contents of one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRecord {
    /// Target CRS of the job (the bucket's UTM zone)
    pub crs: Crs,
    /// Member feature ids in assignment order
    pub fids: Vec<i64>,
    /// Member feature envelopes, in the collection's CRS
    pub bboxes: Vec<BoundingBox>,
    /// Sum of member areas, in the collection's units
    pub area: f64,
}

impl BucketRecord {
    fn new(crs: Crs) -> Self {
        Self {
            crs,
            fids: Vec::new(),
            bboxes: Vec::new(),
            area: 0.0,
        }
    }

    fn push(&mut self, fid: i64, bbox: BoundingBox, area: f64) {
        self.fids.push(fid);
        self.bboxes.push(bbox);
        self.area += area;
    }

    pub fn len(&self) -> usize {
        self.fids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fids.is_empty()
    }

    /// Envelope of all member features.
    pub fn bbox(&self) -> BoundingBox {
        self.bboxes
            .iter()
            .fold(BoundingBox::empty(), |acc, b| acc.union(b))
    }
}

/// A bucket ready for materialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub key: BucketKey,
    pub record: BucketRecord,
}

impl Bucket {
    pub fn job_id(&self) -> String {
        self.key.job_id()
    }
}

struct FeatureMetrics {
    fid: i64,
    area: f64,
    bbox: BoundingBox,
    /// Centroid in geographic coordinates
    lon: f64,
    lat: f64,
}

/// Assigns the features of one collection to buckets.
///
/// # Arguments
///
/// * `collection` - The collection to partition
/// * `settings` - Degree separation, singleton threshold and bucket cap
/// * `explicit` - Feature ids the caller enumerated; when given, only those
///   features are partitioned and each becomes a singleton job
///
/// Assignment is sequential in collection order, so the bucket cap applies
/// to each feature at the moment it joins. Returned buckets are ordered by
/// area descending, ties by job id.
pub fn assign_buckets(
    collection: &Collection,
    settings: &PartitionSettings,
    explicit: Option<&BTreeSet<i64>>,
) -> Result<Vec<Bucket>, PartitionError> {
    if let Some(ids) = explicit {
        let present: BTreeSet<i64> = collection.features.iter().map(|f| f.id).collect();
        if let Some(missing) = ids.iter().find(|id| !present.contains(id)) {
            return Err(PartitionError::UnknownFeature {
                collection: collection.name.clone(),
                fid: *missing,
            });
        }
    }

    let crs = collection.crs;
    let metrics: Vec<FeatureMetrics> = collection
        .features
        .par_iter()
        .filter(|f| explicit.map(|ids| ids.contains(&f.id)).unwrap_or(true))
        .map(|f| -> Result<FeatureMetrics, PartitionError> {
            let (cx, cy) = f.centroid();
            let (lon, lat) = transform_point(cx, cy, crs, Crs::Geographic)?;
            Ok(FeatureMetrics {
                fid: f.id,
                area: f.area(),
                bbox: f.bbox(),
                lon,
                lat,
            })
        })
        .collect::<Result<_, PartitionError>>()?;

    let separation = settings.degree_separation.max(1) as f64;
    let mut records: HashMap<BucketKey, BucketRecord> = HashMap::new();
    // Current (sub index, count) per base grid cell
    let mut sub_buckets: HashMap<(i64, i64, u32), (u32, usize)> = HashMap::new();

    for m in &metrics {
        let zone = utm_zone_for(m.lon, m.lat);
        let key = if m.area > settings.singleton_area || explicit.is_some() {
            BucketKey::Singleton {
                collection: collection.name.clone(),
                fid: m.fid,
            }
        } else {
            let cell_x = (m.lon / separation).floor() as i64 * separation as i64;
            let cell_y = (m.lat / separation).floor() as i64 * separation as i64;
            let (sub, count) = sub_buckets
                .entry((cell_x, cell_y, zone.epsg()))
                .or_insert((0, 0));
            if *count >= settings.max_features_per_job {
                *sub += 1;
                *count = 0;
            }
            *count += 1;
            BucketKey::Grid {
                collection: collection.name.clone(),
                cell_x,
                cell_y,
                epsg: zone.epsg(),
                sub: *sub,
            }
        };
        records
            .entry(key)
            .or_insert_with(|| BucketRecord::new(zone))
            .push(m.fid, m.bbox, m.area);
    }

    let mut buckets: Vec<Bucket> = records
        .into_iter()
        .map(|(key, record)| Bucket { key, record })
        .collect();
    buckets.sort_by(|a, b| {
        b.record
            .area
            .total_cmp(&a.record.area)
            .then_with(|| a.job_id().cmp(&b.job_id()))
    });

    tracing::debug!(
        collection = %collection.name,
        features = metrics.len(),
        buckets = buckets.len(),
        "Assigned features to buckets"
    );
    Ok(buckets)
}
