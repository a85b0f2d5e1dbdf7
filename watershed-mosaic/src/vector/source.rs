//! Spatial unit sources.
//!
//! A [`SpatialUnitSource`] supplies named feature collections (watersheds).
//! [`GeoJsonDirectory`] serves every `*.geojson` file in a directory as one
//! collection named by its file stem.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::codec::read_collection_file;
use super::{Collection, VectorError};

/// File extension for collections and subset files.
pub const GEOJSON_EXTENSION: &str = "geojson";

/// Supplies named spatial-feature collections.
pub trait SpatialUnitSource: Send + Sync {
    /// Returns the collection names in a stable (sorted) order.
    fn collection_names(&self) -> Result<Vec<String>, VectorError>;

    /// Reads one collection in full.
    fn read_collection(&self, name: &str) -> Result<Collection, VectorError>;
}

/// Directory of GeoJSON collections.
#[derive(Debug, Clone)]
pub struct GeoJsonDirectory {
    root: PathBuf,
}

impl GeoJsonDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, GEOJSON_EXTENSION))
    }
}

impl SpatialUnitSource for GeoJsonDirectory {
    fn collection_names(&self) -> Result<Vec<String>, VectorError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| VectorError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case(GEOJSON_EXTENSION))
                    .unwrap_or(false)
            })
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn read_collection(&self, name: &str) -> Result<Collection, VectorError> {
        let path = self.collection_path(name);
        if !path.is_file() {
            return Err(VectorError::UnknownCollection(name.to_string()));
        }
        tracing::debug!(collection = name, path = %path.display(), "Reading collection");
        read_collection_file(&path, name)
    }
}

/// Collections held in memory, mostly for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    collections: BTreeMap<String, Collection>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.collections.insert(collection.name.clone(), collection);
        self
    }
}

impl SpatialUnitSource for InMemorySource {
    fn collection_names(&self) -> Result<Vec<String>, VectorError> {
        Ok(self.collections.keys().cloned().collect())
    }

    fn read_collection(&self, name: &str) -> Result<Collection, VectorError> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| VectorError::UnknownCollection(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_collection(dir: &Path, name: &str, ids: &[i64]) {
        let features: Vec<_> = ids
            .iter()
            .map(|id| {
                let x = *id as f64;
                json!({
                    "type": "Feature", "id": id, "properties": null,
                    "geometry": {"type": "Polygon", "coordinates": [[[x,0],[x+1.0,0],[x+1.0,1],[x,0]]]}
                })
            })
            .collect();
        let fc = json!({"type": "FeatureCollection", "features": features});
        std::fs::write(dir.join(format!("{}.geojson", name)), fc.to_string()).unwrap();
    }

    #[test]
    fn test_directory_lists_sorted_geojson_stems() {
        let dir = TempDir::new().unwrap();
        write_collection(dir.path(), "hybas_eu", &[1]);
        write_collection(dir.path(), "hybas_af", &[1, 2]);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = GeoJsonDirectory::new(dir.path());
        assert_eq!(source.collection_names().unwrap(), vec!["hybas_af", "hybas_eu"]);

        let af = source.read_collection("hybas_af").unwrap();
        assert_eq!(af.name, "hybas_af");
        assert_eq!(af.len(), 2);
        assert!(af.features.iter().all(|f| f.collection == "hybas_af"));
    }

    #[test]
    fn test_directory_unknown_collection() {
        let dir = TempDir::new().unwrap();
        let source = GeoJsonDirectory::new(dir.path());
        assert!(matches!(
            source.read_collection("missing"),
            Err(VectorError::UnknownCollection(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let source = GeoJsonDirectory::new("/nonexistent/watersheds");
        assert!(matches!(source.collection_names(), Err(VectorError::Io { .. })));
    }

    #[test]
    fn test_in_memory_source() {
        let source = InMemorySource::new().with_collection(Collection::new(
            "basins",
            crate::coord::Crs::Geographic,
            vec![],
        ));
        assert_eq!(source.collection_names().unwrap(), vec!["basins"]);
        assert!(source.read_collection("basins").unwrap().is_empty());
        assert!(source.read_collection("other").is_err());
    }
}
