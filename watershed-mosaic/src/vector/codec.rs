//! GeoJSON <-> feature conversion.

use std::collections::HashSet;
use std::path::Path;

use geojson::feature::Id;
use geojson::{GeoJson, Geometry, Value};

use super::{Collection, VectorError};
use crate::coord::Crs;
use crate::geometry::{Feature, GeometryError, MultiPolygon, Polygon, Ring};

/// Property consulted for the feature id when the GeoJSON `id` is absent.
pub const FID_PROPERTY: &str = "fid";

fn ring_from_positions(positions: &[Vec<f64>]) -> Ring {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| [p[0], p[1]])
        .collect()
}

fn polygon_from_rings(id: i64, rings: &[Vec<Vec<f64>>]) -> Result<Polygon, GeometryError> {
    let mut iter = rings.iter();
    let exterior = iter
        .next()
        .map(|r| ring_from_positions(r))
        .ok_or(GeometryError::Degenerate(id))?;
    if exterior.len() < 3 {
        return Err(GeometryError::Degenerate(id));
    }
    let holes = iter.map(|r| ring_from_positions(r)).collect();
    Ok(Polygon::new(exterior, holes))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Resolves a feature id: numeric `id`, then numeric `fid` property, then
/// the feature's position in the collection.
fn resolve_id(feature: &geojson::Feature, index: usize) -> i64 {
    if let Some(Id::Number(n)) = &feature.id {
        if let Some(id) = n.as_i64() {
            return id;
        }
    }
    if let Some(Id::String(s)) = &feature.id {
        if let Ok(id) = s.parse::<i64>() {
            return id;
        }
    }
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get(FID_PROPERTY))
        .and_then(|v| v.as_i64())
        .unwrap_or(index as i64)
}

/// Converts one GeoJSON feature into a [`Feature`].
pub fn feature_from_geojson(
    feature: &geojson::Feature,
    index: usize,
    collection: &str,
) -> Result<Feature, GeometryError> {
    let id = resolve_id(feature, index);
    let geometry = feature.geometry.as_ref().ok_or(GeometryError::Missing(id))?;

    let polygons = match &geometry.value {
        Value::Polygon(rings) => vec![polygon_from_rings(id, rings)?],
        Value::MultiPolygon(parts) => parts
            .iter()
            .map(|rings| polygon_from_rings(id, rings))
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(GeometryError::Unsupported {
                id,
                kind: value_kind(other).to_string(),
            })
        }
    };

    Ok(Feature {
        id,
        collection: collection.to_string(),
        geometry: MultiPolygon(polygons),
        properties: feature.properties.clone(),
    })
}

fn ring_to_positions(ring: &Ring) -> Vec<Vec<f64>> {
    let mut positions: Vec<Vec<f64>> = ring.iter().map(|[x, y]| vec![*x, *y]).collect();
    // GeoJSON rings are explicitly closed
    if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
        if first != last {
            positions.push(vec![first[0], first[1]]);
        }
    }
    positions
}

/// Converts a [`Feature`] back into a GeoJSON feature with a numeric id.
pub fn feature_to_geojson(feature: &Feature) -> geojson::Feature {
    let rings = |p: &Polygon| -> Vec<Vec<Vec<f64>>> {
        std::iter::once(&p.exterior)
            .chain(p.holes.iter())
            .map(ring_to_positions)
            .collect()
    };
    let value = match feature.geometry.0.as_slice() {
        [single] => Value::Polygon(rings(single)),
        many => Value::MultiPolygon(many.iter().map(rings).collect()),
    };
    geojson::Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: Some(Id::Number(feature.id.into())),
        properties: feature.properties.clone(),
        foreign_members: None,
    }
}

/// Parses GeoJSON text into a feature collection.
pub(super) fn parse_feature_collection(
    path: &Path,
    text: &str,
) -> Result<geojson::FeatureCollection, VectorError> {
    let geojson = text.parse::<GeoJson>().map_err(|e| VectorError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(VectorError::NotFeatureCollection(path.to_path_buf())),
    }
}

/// Reads a GeoJSON file as a named geographic collection.
///
/// Feature ids must be unique within the collection.
pub fn read_collection_file(path: &Path, name: &str) -> Result<Collection, VectorError> {
    let text = std::fs::read_to_string(path).map_err(|source| VectorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let fc = parse_feature_collection(path, &text)?;
    let crs = super::subset::crs_from_foreign_members(path, fc.foreign_members.as_ref())?
        .unwrap_or(Crs::Geographic);

    let mut seen = HashSet::with_capacity(fc.features.len());
    let mut features = Vec::with_capacity(fc.features.len());
    for (index, gj) in fc.features.iter().enumerate() {
        let feature = feature_from_geojson(gj, index, name).map_err(|source| VectorError::Geometry {
            path: path.to_path_buf(),
            source,
        })?;
        if !seen.insert(feature.id) {
            return Err(VectorError::DuplicateFeatureId {
                collection: name.to_string(),
                id: feature.id,
            });
        }
        features.push(feature);
    }

    Ok(Collection::new(name, crs, features))
}
