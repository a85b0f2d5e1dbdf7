//! Read-only run configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::PipelineError;
use crate::catalog::Catalog;
use crate::config::ConfigFile;
use crate::executor::InputRaster;
use crate::partition::{FeatureSubset, PartitionSettings, Partitioner};
use crate::raster::{MosaicSpec, OverlapPolicy, MOSAIC_EXTENSION};
use crate::stitch::DEFAULT_FLUSH_THRESHOLD;
use crate::vector::SpatialUnitSource;

/// Directory under the workspace holding subset files and the partition
/// marker.
pub const SUBSETS_DIR: &str = "subsets";

/// One model output routed to a mosaic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMapping {
    /// File the model writes inside its job workspace
    pub file_name: String,
    /// Target mosaic name
    pub mosaic: String,
}

impl OutputMapping {
    pub fn new(file_name: impl Into<String>, mosaic: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            mosaic: mosaic.into(),
        }
    }
}

/// Everything one run needs, built once before the run starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run workspace root
    pub workspace: PathBuf,
    /// Directory of GeoJSON watershed collections
    pub watersheds: PathBuf,
    pub partition: PartitionSettings,
    pub subset: Option<FeatureSubset>,
    pub max_parallel: usize,
    /// Pixel size in target projection units
    pub target_pixel_size: f64,
    pub inputs: Vec<InputRaster>,
    pub parameters: BTreeMap<String, f64>,
    pub outputs: Vec<OutputMapping>,
    pub flush_threshold: usize,
    pub mosaic_dir: PathBuf,
    pub mosaic_spec: MosaicSpec,
    pub area_weighted: bool,
    pub overlap: OverlapPolicy,
    pub catalog: Catalog,
}

impl PipelineConfig {
    /// Creates a configuration with default settings, no inputs and no
    /// outputs.
    pub fn new(workspace: impl Into<PathBuf>, watersheds: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let defaults = ConfigFile::default();
        Self {
            mosaic_dir: workspace.join(crate::config::DEFAULT_MOSAIC_DIR_NAME),
            catalog: Catalog::new(&workspace),
            workspace,
            watersheds: watersheds.into(),
            partition: PartitionSettings::default(),
            subset: None,
            max_parallel: defaults.executor.max_parallel,
            target_pixel_size: defaults.executor.target_pixel_size,
            inputs: Vec::new(),
            parameters: BTreeMap::new(),
            outputs: Vec::new(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            mosaic_spec: MosaicSpec::new(
                defaults.mosaic.bounds,
                defaults.mosaic.pixel_size,
                defaults.mosaic.nodata,
                defaults.mosaic.tile_size,
            ),
            area_weighted: defaults.mosaic.area_weighted,
            overlap: defaults.mosaic.overlap,
        }
    }

    /// Builds the run configuration from a loaded config file.
    ///
    /// `catalog:<name>` input values are resolved through the file's
    /// catalog; entries that do not point at data on disk only warn.
    pub fn from_config_file(config: &ConfigFile) -> Result<Self, PipelineError> {
        let watersheds = config
            .partition
            .watersheds
            .clone()
            .ok_or_else(|| PipelineError::Config("partition.watersheds is not set".to_string()))?;
        let workspace = config.workspace.directory.clone();
        let catalog = Catalog::new(&workspace).with_entries(config.catalog.clone());

        let mut inputs = Vec::with_capacity(config.inputs.len());
        for (name, value) in &config.inputs {
            let path = catalog.resolve_input(value)?;
            let method = config.resample.get(name).copied().unwrap_or_default();
            inputs.push(InputRaster::new(name.clone(), path, method));
        }
        for name in config.resample.keys() {
            if !config.inputs.contains_key(name) {
                tracing::warn!(input = %name, "Resample method configured for unknown input");
            }
        }

        let subset = config
            .partition
            .subset
            .as_deref()
            .map(FeatureSubset::parse)
            .transpose()?;

        let spec = MosaicSpec::new(
            config.mosaic.bounds,
            config.mosaic.pixel_size,
            config.mosaic.nodata,
            config.mosaic.tile_size,
        );
        spec.validate()?;

        Ok(Self {
            mosaic_dir: config.mosaic_directory(),
            workspace,
            watersheds,
            partition: PartitionSettings {
                degree_separation: config.partition.degree_separation,
                singleton_area: config.partition.singleton_area,
                max_features_per_job: config.partition.max_features_per_job,
            },
            subset,
            max_parallel: config.executor.max_parallel,
            target_pixel_size: config.executor.target_pixel_size,
            inputs,
            parameters: config.model.clone(),
            outputs: config
                .outputs
                .iter()
                .map(|(file, mosaic)| OutputMapping::new(file.clone(), mosaic.clone()))
                .collect(),
            flush_threshold: config.stitch.flush_threshold,
            mosaic_spec: spec,
            area_weighted: config.mosaic.area_weighted,
            overlap: config.mosaic.overlap,
            catalog,
        })
    }

    pub fn with_input(mut self, input: InputRaster) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, file_name: impl Into<String>, mosaic: impl Into<String>) -> Self {
        self.outputs.push(OutputMapping::new(file_name, mosaic));
        self
    }

    pub fn with_mosaic_spec(mut self, spec: MosaicSpec) -> Self {
        self.mosaic_spec = spec;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_partition(mut self, settings: PartitionSettings) -> Self {
        self.partition = settings;
        self
    }

    pub fn with_target_pixel_size(mut self, pixel_size: f64) -> Self {
        self.target_pixel_size = pixel_size;
        self
    }

    pub fn with_area_weighted(mut self, area_weighted: bool) -> Self {
        self.area_weighted = area_weighted;
        self
    }

    /// Directory holding subset files and the partition marker.
    pub fn subset_dir(&self) -> PathBuf {
        self.workspace.join(SUBSETS_DIR)
    }

    /// Partitioner over `source` with this run's settings and subset.
    pub fn partitioner(&self, source: Arc<dyn SpatialUnitSource>) -> Partitioner {
        let partitioner = Partitioner::new(source, self.subset_dir()).with_settings(self.partition.clone());
        match &self.subset {
            Some(subset) => partitioner.with_subset(subset.clone()),
            None => partitioner,
        }
    }

    /// Distinct mosaic names, sorted.
    pub fn mosaic_names(&self) -> BTreeSet<&str> {
        self.outputs.iter().map(|o| o.mosaic.as_str()).collect()
    }

    /// Store directory of a mosaic.
    pub fn mosaic_path(&self, name: &str) -> PathBuf {
        mosaic_path(&self.mosaic_dir, name)
    }
}

/// `<dir>/<name>.mosaic`
pub fn mosaic_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, MOSAIC_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ResampleMethod;

    #[test]
    fn test_from_config_file_resolves_catalog_inputs() {
        let mut file = ConfigFile::default();
        file.workspace.directory = PathBuf::from("/runs/a");
        file.partition.watersheds = Some(PathBuf::from("/data/basins"));
        file.partition.subset = Some("basins:4".into());
        file.inputs.insert("dem".into(), "/data/dem.mosaic".into());
        file.inputs.insert("lulc".into(), "catalog:ESA".into());
        file.resample.insert("lulc".into(), ResampleMethod::Mode);
        file.catalog.insert("ESA".into(), "https://host/esa_lulc.tif".into());
        file.outputs.insert("sed_export.wgr".into(), "sed".into());
        file.outputs.insert("n_export.wgr".into(), "n".into());

        let config = PipelineConfig::from_config_file(&file).unwrap();
        assert_eq!(
            config.inputs,
            vec![
                InputRaster::new("dem", "/data/dem.mosaic", ResampleMethod::Nearest),
                InputRaster::new("lulc", "/runs/a/data/esa_lulc.tif", ResampleMethod::Mode),
            ]
        );
        assert_eq!(config.subset_dir(), PathBuf::from("/runs/a/subsets"));
        assert_eq!(config.mosaic_path("sed"), PathBuf::from("/runs/a/mosaics/sed.mosaic"));
        assert_eq!(config.mosaic_names().into_iter().collect::<Vec<_>>(), vec!["n", "sed"]);
        assert!(config.subset.is_some());
    }

    #[test]
    fn test_missing_watersheds_is_a_config_error() {
        let err = PipelineConfig::from_config_file(&ConfigFile::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_unknown_catalog_reference_fails() {
        let mut file = ConfigFile::default();
        file.partition.watersheds = Some(PathBuf::from("/data/basins"));
        file.inputs.insert("dem".into(), "catalog:DEM".into());
        assert!(matches!(
            PipelineConfig::from_config_file(&file),
            Err(PipelineError::Catalog(_))
        ));
    }
}
