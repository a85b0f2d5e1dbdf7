//! Job subset files.
//!
//! A subset file is a standalone GeoJSON feature collection holding the
//! features of one job, reprojected into the job's coordinate-reference zone.
//! The CRS is recorded in the (legacy but widely read) `crs` member, alongside
//! `collection` and `job_id`.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use super::codec::{feature_from_geojson, feature_to_geojson, parse_feature_collection};
use super::VectorError;
use crate::coord::{BoundingBox, Crs};
use crate::geometry::Feature;

const CRS_MEMBER: &str = "crs";
const COLLECTION_MEMBER: &str = "collection";
const JOB_ID_MEMBER: &str = "job_id";

/// A job subset as read back from disk.
#[derive(Debug, Clone)]
pub struct SubsetFile {
    pub path: PathBuf,
    pub job_id: String,
    pub collection: String,
    pub crs: Crs,
    pub features: Vec<Feature>,
}

impl SubsetFile {
    /// Envelope of all features, in the subset's CRS.
    pub fn bbox(&self) -> BoundingBox {
        self.features
            .iter()
            .fold(BoundingBox::empty(), |acc, f| acc.union(&f.bbox()))
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

/// Metadata of a vector file without keeping its features.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorInfo {
    pub feature_count: usize,
    pub crs: Crs,
    pub bbox: BoundingBox,
}

/// Reads the `crs` foreign member, accepting either the named-CRS object
/// form or a plain string.
pub(super) fn crs_from_foreign_members(
    path: &Path,
    members: Option<&Map<String, Value>>,
) -> Result<Option<Crs>, VectorError> {
    let Some(value) = members.and_then(|m| m.get(CRS_MEMBER)) else {
        return Ok(None);
    };
    let name = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj
            .get("properties")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str()),
        _ => None,
    };
    let name = name.ok_or_else(|| VectorError::Crs {
        path: path.to_path_buf(),
        message: format!("unrecognised crs member {}", value),
    })?;
    name.parse::<Crs>().map(Some).map_err(|e| VectorError::Crs {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn crs_member(crs: Crs) -> Value {
    json!({
        "type": "name",
        "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", crs.epsg()) }
    })
}

/// Reprojects features, failing if the output count differs from the input.
pub fn reproject_collection(
    name: &str,
    features: &[Feature],
    from: Crs,
    to: Crs,
) -> Result<Vec<Feature>, VectorError> {
    let reprojected: Vec<Feature> = features
        .iter()
        .filter_map(|f| match f.reprojected(from, to) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(collection = name, error = %e, "Dropping feature that failed to reproject");
                None
            }
        })
        .collect();

    if reprojected.len() != features.len() {
        return Err(VectorError::FeatureCountMismatch {
            name: name.to_string(),
            expected: features.len(),
            actual: reprojected.len(),
        });
    }
    Ok(reprojected)
}

/// Writes a subset file. The write goes through a temp file and a rename so
/// that the path existing always means the subset is complete.
pub fn write_subset(
    path: &Path,
    job_id: &str,
    collection: &str,
    crs: Crs,
    features: &[Feature],
) -> Result<(), VectorError> {
    let mut foreign = Map::new();
    foreign.insert(CRS_MEMBER.to_string(), crs_member(crs));
    foreign.insert(COLLECTION_MEMBER.to_string(), Value::from(collection));
    foreign.insert(JOB_ID_MEMBER.to_string(), Value::from(job_id));

    let fc = geojson::FeatureCollection {
        bbox: None,
        features: features.iter().map(feature_to_geojson).collect(),
        foreign_members: Some(foreign),
    };

    let io_err = |source| VectorError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = serde_json::to_string(&fc).map_err(|e| VectorError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("geojson.tmp");
    std::fs::write(&tmp, text).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

/// Reads a subset file written by [`write_subset`].
pub fn read_subset(path: &Path) -> Result<SubsetFile, VectorError> {
    let text = std::fs::read_to_string(path).map_err(|source| VectorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let fc = parse_feature_collection(path, &text)?;
    let members = fc.foreign_members.as_ref();
    let crs = crs_from_foreign_members(path, members)?.unwrap_or(Crs::Geographic);
    let member_str = |key: &str| {
        members
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let job_id = member_str(JOB_ID_MEMBER).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let collection = member_str(COLLECTION_MEMBER).unwrap_or_default();

    let features = fc
        .features
        .iter()
        .enumerate()
        .map(|(i, f)| feature_from_geojson(f, i, &collection))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| VectorError::Geometry {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(SubsetFile {
        path: path.to_path_buf(),
        job_id,
        collection,
        crs,
        features,
    })
}

/// Feature count, CRS and envelope of a vector file.
pub fn vector_info(path: &Path) -> Result<VectorInfo, VectorError> {
    let subset = read_subset(path)?;
    Ok(VectorInfo {
        feature_count: subset.feature_count(),
        crs: subset.crs,
        bbox: subset.bbox(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{MultiPolygon, Polygon};
    use tempfile::TempDir;

    fn square_feature(id: i64, x0: f64, y0: f64) -> Feature {
        Feature::new(
            id,
            "hybas_eu",
            MultiPolygon(vec![Polygon::new(
                vec![
                    [x0, y0],
                    [x0 + 0.1, y0],
                    [x0 + 0.1, y0 + 0.1],
                    [x0, y0 + 0.1],
                    [x0, y0],
                ],
                vec![],
            )]),
        )
    }

    #[test]
    fn test_write_then_read_subset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hybas_eu_12_a0.020000.geojson");
        let crs = Crs::Utm { zone: 33, north: true };
        let features = vec![square_feature(1, 14.0, 45.0), square_feature(2, 14.2, 45.0)];
        let projected = reproject_collection("job", &features, Crs::Geographic, crs).unwrap();

        write_subset(&path, "hybas_eu_12", "hybas_eu", crs, &projected).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("geojson.tmp").exists());

        let subset = read_subset(&path).unwrap();
        assert_eq!(subset.job_id, "hybas_eu_12");
        assert_eq!(subset.collection, "hybas_eu");
        assert_eq!(subset.crs, crs);
        assert_eq!(subset.feature_count(), 2);
        assert_eq!(
            subset.features.iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let info = vector_info(&path).unwrap();
        assert_eq!(info.feature_count, 2);
        assert_eq!(info.crs, crs);
        // Projected metres, not degrees
        assert!(info.bbox.min_x > 100_000.0 && info.bbox.max_y > 4_000_000.0);
    }

    #[test]
    fn test_reproject_count_mismatch_is_fatal() {
        // Latitude 95 cannot be projected, so one feature is lost
        let features = vec![square_feature(1, 14.0, 45.0), square_feature(2, 14.0, 95.0)];
        let err = reproject_collection(
            "bad",
            &features,
            Crs::Geographic,
            Crs::Utm { zone: 33, north: true },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VectorError::FeatureCountMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_crs_member_accepts_plain_string() {
        let mut members = Map::new();
        members.insert("crs".into(), Value::from("EPSG:32701"));
        let crs = crs_from_foreign_members(Path::new("x"), Some(&members)).unwrap();
        assert_eq!(crs, Some(Crs::Utm { zone: 1, north: false }));

        members.insert("crs".into(), Value::from(12));
        assert!(crs_from_foreign_members(Path::new("x"), Some(&members)).is_err());
        assert_eq!(crs_from_foreign_members(Path::new("x"), None).unwrap(), None);
    }
}
