//! Data catalog: logical dataset names mapped to where the data lives.
//!
//! Entries are remote URLs, local paths, or free-text placeholders for
//! datasets that still have to be derived. Only unknown names are errors;
//! anything that merely does not resolve to data on disk is passed through
//! with a warning so that later stages can decide what to do with it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Prefix marking an input value as a catalog reference.
pub const CATALOG_PREFIX: &str = "catalog:";

/// Directory under the workspace where remote datasets are cached.
pub const DATA_DIR: &str = "data";

const REMOTE_SCHEMES: [&str; 3] = ["http://", "https://", "gs://"];

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Reference to a name that is not in the catalog
    #[error("unknown catalog entry '{0}'")]
    UnknownEntry(String),
}

/// How a catalog entry resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Remote dataset and where its cached copy lives
    Remote {
        url: String,
        local: PathBuf,
        cached: bool,
    },
    /// Local file or directory
    Local { path: PathBuf, exists: bool },
    /// Not a location at all, kept verbatim
    Placeholder(String),
}

impl Resource {
    /// Path later stages should read, if the entry names one.
    pub fn local_path(&self) -> PathBuf {
        match self {
            Resource::Remote { local, .. } => local.clone(),
            Resource::Local { path, .. } => path.clone(),
            Resource::Placeholder(text) => PathBuf::from(text),
        }
    }

    /// True when the data is on disk.
    pub fn is_available(&self) -> bool {
        match self {
            Resource::Remote { cached, .. } => *cached,
            Resource::Local { exists, .. } => *exists,
            Resource::Placeholder(_) => false,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Remote { url, local, cached } => {
                let state = if *cached { "cached" } else { "not cached" };
                write!(f, "remote {} -> {} ({})", url, local.display(), state)
            }
            Resource::Local { path, exists } => {
                let state = if *exists { "present" } else { "missing" };
                write!(f, "local {} ({})", path.display(), state)
            }
            Resource::Placeholder(text) => write!(f, "placeholder {:?}", text),
        }
    }
}

/// Named datasets for one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, String>,
    cache_dir: PathBuf,
}

impl Catalog {
    /// Creates an empty catalog caching remote data under
    /// `<workspace>/data`.
    pub fn new(workspace: &Path) -> Self {
        Self {
            entries: BTreeMap::new(),
            cache_dir: workspace.join(DATA_DIR),
        }
    }

    pub fn with_entries(mut self, entries: BTreeMap<String, String>) -> Self {
        self.entries = entries;
        self
    }

    pub fn with_entry(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Classifies one entry. Only an unknown name is an error; entries
    /// without data on disk are logged and returned as they are.
    pub fn resolve(&self, name: &str) -> Result<Resource, CatalogError> {
        let value = self
            .entries
            .get(name)
            .ok_or_else(|| CatalogError::UnknownEntry(name.to_string()))?;
        let resource = classify(value.trim(), &self.cache_dir);
        match &resource {
            Resource::Remote { url, cached: false, .. } => {
                tracing::warn!(entry = %name, url = %url, "Remote dataset not cached, passing through");
            }
            Resource::Local { path, exists: false } => {
                tracing::warn!(entry = %name, path = %path.display(), "Local dataset missing, passing through");
            }
            Resource::Placeholder(text) => {
                tracing::warn!(entry = %name, value = %text, "Catalog entry is not a fetchable resource, passing through");
            }
            _ => {}
        }
        Ok(resource)
    }

    /// Resolves every entry, in name order.
    pub fn resolve_all(&self) -> Vec<(String, Resource)> {
        self.entries
            .keys()
            .filter_map(|name| self.resolve(name).ok().map(|r| (name.clone(), r)))
            .collect()
    }

    /// Resolves an input value: `catalog:<name>` becomes the entry's local
    /// path, anything else is taken as a path.
    pub fn resolve_input(&self, value: &str) -> Result<PathBuf, CatalogError> {
        match value.trim().strip_prefix(CATALOG_PREFIX) {
            Some(name) => Ok(self.resolve(name.trim())?.local_path()),
            None => Ok(PathBuf::from(value.trim())),
        }
    }
}

fn classify(value: &str, cache_dir: &Path) -> Resource {
    if REMOTE_SCHEMES.iter().any(|s| value.starts_with(s)) {
        let basename = value
            .split(['?', '#'])
            .next()
            .and_then(|v| v.rsplit('/').next())
            .unwrap_or(value);
        let local = cache_dir.join(basename);
        let cached = local.exists();
        return Resource::Remote {
            url: value.to_string(),
            local,
            cached,
        };
    }
    if looks_like_path(value) {
        let path = PathBuf::from(value);
        let exists = path.exists();
        return Resource::Local { path, exists };
    }
    Resource::Placeholder(value.to_string())
}

/// Placeholders are free text: they carry whitespace or parentheses, or
/// have no path separator or extension at all.
fn looks_like_path(value: &str) -> bool {
    if value.is_empty() || value.starts_with('(') {
        return false;
    }
    let has_separator = value.contains('/') || value.contains('\\');
    let has_extension = Path::new(value).extension().is_some();
    (has_separator || has_extension) && !value.contains(' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classifies_entries() {
        let dir = TempDir::new().unwrap();
        let dem = dir.path().join("dem.wgr");
        std::fs::write(&dem, b"x").unwrap();

        let catalog = Catalog::new(dir.path())
            .with_entry("DEM", dem.to_string_lossy())
            .with_entry("ESA_LULC", "https://storage.googleapis.com/root/esa_lulc.tif")
            .with_entry("Habitat mask", "(need to make from LULC above)")
            .with_entry("Missing", "/nowhere/precip.wgr");

        assert_eq!(
            catalog.resolve("DEM").unwrap(),
            Resource::Local {
                path: dem.clone(),
                exists: true
            }
        );
        assert_eq!(
            catalog.resolve("ESA_LULC").unwrap(),
            Resource::Remote {
                url: "https://storage.googleapis.com/root/esa_lulc.tif".into(),
                local: dir.path().join("data/esa_lulc.tif"),
                cached: false,
            }
        );
        assert_eq!(
            catalog.resolve("Habitat mask").unwrap(),
            Resource::Placeholder("(need to make from LULC above)".into())
        );
        assert!(!catalog.resolve("Missing").unwrap().is_available());
        assert!(matches!(catalog.resolve("Nope"), Err(CatalogError::UnknownEntry(_))));
    }

    #[test]
    fn test_cached_remote_is_available() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/r.tif"), b"x").unwrap();
        let catalog = Catalog::new(dir.path()).with_entry("R", "gs://bucket/r.tif?alt=media");
        assert!(catalog.resolve("R").unwrap().is_available());
    }

    #[test]
    fn test_resolve_input() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::new(dir.path()).with_entry("Erosivity", "https://host/path/erosivity.tif");

        assert_eq!(
            catalog.resolve_input("catalog:Erosivity").unwrap(),
            dir.path().join("data/erosivity.tif")
        );
        assert_eq!(catalog.resolve_input(" ./dem.wgr ").unwrap(), PathBuf::from("./dem.wgr"));
        assert!(catalog.resolve_input("catalog:Unknown").is_err());
        // Placeholders pass through verbatim
        let catalog = catalog.with_entry("Mask", "(will be outputs of CV)");
        assert_eq!(
            catalog.resolve_input("catalog:Mask").unwrap(),
            PathBuf::from("(will be outputs of CV)")
        );
    }

    #[test]
    fn test_resolve_all_in_name_order() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::new(dir.path())
            .with_entry("b", "(later)")
            .with_entry("a", "(sooner)");
        let names: Vec<String> = catalog.resolve_all().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
