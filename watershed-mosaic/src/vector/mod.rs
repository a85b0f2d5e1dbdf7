//! GeoJSON vector I/O.
//!
//! Collections are read into [`Collection`]s of [`Feature`]s, and job subsets
//! are written back as standalone GeoJSON feature collections that carry their
//! CRS, source collection and job id as foreign members.
//!
//! # Submodules
//!
//! - `codec` - GeoJSON <-> [`Feature`] conversion
//! - `source` - [`SpatialUnitSource`] and the directory-backed implementation
//! - `subset` - subset file write/read and count-checked reprojection

mod codec;
mod source;
mod subset;

pub use codec::{feature_from_geojson, feature_to_geojson, read_collection_file};
pub use source::{GeoJsonDirectory, InMemorySource, SpatialUnitSource, GEOJSON_EXTENSION};
pub use subset::{read_subset, reproject_collection, vector_info, write_subset, SubsetFile, VectorInfo};

use std::path::PathBuf;

use thiserror::Error;

use crate::coord::Crs;
use crate::geometry::{Feature, GeometryError};

/// Errors from vector reading, writing and reprojection.
#[derive(Debug, Error)]
pub enum VectorError {
    /// I/O error on a vector file
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not parseable GeoJSON
    #[error("invalid GeoJSON in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// GeoJSON is valid but not a FeatureCollection
    #[error("{0} is not a FeatureCollection")]
    NotFeatureCollection(PathBuf),

    /// Bad feature geometry
    #[error("{path}: {source}")]
    Geometry {
        path: PathBuf,
        #[source]
        source: GeometryError,
    },

    /// Two features in one collection share an id
    #[error("collection '{collection}' has duplicate feature id {id}")]
    DuplicateFeatureId { collection: String, id: i64 },

    /// Requested collection is not provided by the source
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    /// Reprojection lost or gained features
    #[error("reprojection of '{name}' produced {actual} features, expected {expected}")]
    FeatureCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Invalid CRS foreign member
    #[error("invalid crs in {path}: {message}")]
    Crs { path: PathBuf, message: String },
}

/// A named, in-memory feature collection.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub crs: Crs,
    pub features: Vec<Feature>,
}

impl Collection {
    pub fn new(name: impl Into<String>, crs: Crs, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            crs,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns the features whose ids are in `ids`, in collection order.
    pub fn filter_ids(&self, ids: &std::collections::HashSet<i64>) -> Vec<Feature> {
        self.features
            .iter()
            .filter(|f| ids.contains(&f.id))
            .cloned()
            .collect()
    }
}
