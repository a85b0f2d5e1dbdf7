//! Spatial features and planar polygon measures.
//!
//! A [`Feature`] is one spatial unit (a watershed): an integer id that is
//! unique within its source collection, a (multi)polygon geometry, and the
//! properties it was read with. Measures are planar and expressed in the
//! units of the geometry's CRS, so areas of geographic input are in
//! square degrees.

mod polygon;

pub use polygon::{MultiPolygon, Polygon, Ring};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::coord::{BoundingBox, CoordError, Crs};

/// Errors raised while interpreting feature geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// Geometry type other than Polygon/MultiPolygon
    #[error("feature {id}: unsupported geometry type '{kind}'")]
    Unsupported { id: i64, kind: String },

    /// Feature has no geometry at all
    #[error("feature {0}: missing geometry")]
    Missing(i64),

    /// Polygon with no rings, or a ring with fewer than three positions
    #[error("feature {0}: degenerate polygon")]
    Degenerate(i64),

    /// Coordinate transform failed
    #[error("feature {id}: {source}")]
    Transform {
        id: i64,
        #[source]
        source: CoordError,
    },
}

/// One spatial unit of a source collection. Immutable once read.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Integer id, unique within its collection
    pub id: i64,
    /// Name of the collection this feature came from
    pub collection: String,
    /// Polygon geometry
    pub geometry: MultiPolygon,
    /// Attributes carried through to subset files
    pub properties: Option<Map<String, Value>>,
}

impl Feature {
    pub fn new(id: i64, collection: impl Into<String>, geometry: MultiPolygon) -> Self {
        Self {
            id,
            collection: collection.into(),
            geometry,
            properties: None,
        }
    }

    /// Planar area in the geometry's units.
    pub fn area(&self) -> f64 {
        self.geometry.area()
    }

    /// Area-weighted centroid. Falls back to the bbox centre for zero-area
    /// geometry.
    pub fn centroid(&self) -> (f64, f64) {
        self.geometry.centroid()
    }

    pub fn bbox(&self) -> BoundingBox {
        self.geometry.bbox()
    }

    /// Returns a copy with every vertex transformed between two CRSs.
    pub fn reprojected(&self, from: Crs, to: Crs) -> Result<Feature, GeometryError> {
        let geometry = self
            .geometry
            .try_map(|x, y| crate::coord::transform_point(x, y, from, to))
            .map_err(|source| GeometryError::Transform {
                id: self.id,
                source,
            })?;
        Ok(Feature {
            id: self.id,
            collection: self.collection.clone(),
            geometry,
            properties: self.properties.clone(),
        })
    }
}
