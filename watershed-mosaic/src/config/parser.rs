//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module is the single place where INI key names are mapped to
//! struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::coord::BoundingBox;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses `key` of `section` with `FromStr`, if present and non-empty.
fn parse_value<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    match props.get(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, v, reason)),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn non_empty(props: &Properties, key: &str) -> Option<String> {
    props
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [workspace] section
    if let Some(section) = ini.section(Some("workspace")) {
        if let Some(v) = non_empty(section, "directory") {
            config.workspace.directory = expand_tilde(&v);
        }
    }

    // [partition] section
    if let Some(section) = ini.section(Some("partition")) {
        if let Some(v) = non_empty(section, "watersheds") {
            config.partition.watersheds = Some(expand_tilde(&v));
        }
        if let Some(v) = parse_value::<u32>(section, "partition", "degree_separation", "must be a positive integer (degrees)")? {
            if v == 0 {
                return Err(invalid("partition", "degree_separation", "0", "must be a positive integer (degrees)"));
            }
            config.partition.degree_separation = v;
        }
        if let Some(v) = parse_value::<f64>(section, "partition", "singleton_area", "must be a non-negative number")? {
            if !(v >= 0.0) {
                return Err(invalid("partition", "singleton_area", &v.to_string(), "must be a non-negative number"));
            }
            config.partition.singleton_area = v;
        }
        if let Some(v) = parse_value::<usize>(section, "partition", "max_features_per_job", "must be a positive integer")? {
            if v == 0 {
                return Err(invalid("partition", "max_features_per_job", "0", "must be a positive integer"));
            }
            config.partition.max_features_per_job = v;
        }
        if let Some(v) = non_empty(section, "subset") {
            crate::partition::FeatureSubset::parse(&v)
                .map_err(|_| invalid("partition", "subset", &v, "expected comma-separated collection:fid pairs"))?;
            config.partition.subset = Some(v);
        }
    }

    // [executor] section
    if let Some(section) = ini.section(Some("executor")) {
        if let Some(v) = parse_value::<usize>(section, "executor", "max_parallel", "must be a positive integer")? {
            if v == 0 {
                return Err(invalid("executor", "max_parallel", "0", "must be a positive integer"));
            }
            config.executor.max_parallel = v;
        }
        if let Some(v) = non_empty(section, "model_program") {
            config.executor.model_program = Some(v);
        }
        if let Some(v) = section.get("model_args") {
            config.executor.model_args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = parse_value::<f64>(section, "executor", "target_pixel_size", "must be a positive number")? {
            if !(v > 0.0) {
                return Err(invalid("executor", "target_pixel_size", &v.to_string(), "must be a positive number"));
            }
            config.executor.target_pixel_size = v;
        }
    }

    // [stitch] section
    if let Some(section) = ini.section(Some("stitch")) {
        if let Some(v) = parse_value::<usize>(section, "stitch", "flush_threshold", "must be a non-negative integer")? {
            config.stitch.flush_threshold = v;
        }
    }

    // [mosaic] section
    if let Some(section) = ini.section(Some("mosaic")) {
        if let Some(v) = non_empty(section, "directory") {
            config.mosaic.directory = Some(expand_tilde(&v));
        }
        if let Some(v) = parse_value::<f64>(section, "mosaic", "pixel_size", "must be a positive number (degrees)")? {
            if !(v > 0.0) {
                return Err(invalid("mosaic", "pixel_size", &v.to_string(), "must be a positive number (degrees)"));
            }
            config.mosaic.pixel_size = v;
        }
        if let Some(v) = parse_value::<f64>(section, "mosaic", "nodata", "must be a number")? {
            config.mosaic.nodata = v;
        }
        if let Some(v) = non_empty(section, "bounds") {
            config.mosaic.bounds = BoundingBox::parse(&v)
                .map_err(|_| invalid("mosaic", "bounds", &v, "expected min_lon,min_lat,max_lon,max_lat"))?;
        }
        if let Some(v) = parse_value::<usize>(section, "mosaic", "tile_size", "must be a positive integer")? {
            if v == 0 {
                return Err(invalid("mosaic", "tile_size", "0", "must be a positive integer"));
            }
            config.mosaic.tile_size = v;
        }
        if let Some(v) = non_empty(section, "area_weighted") {
            config.mosaic.area_weighted =
                parse_bool(&v).ok_or_else(|| invalid("mosaic", "area_weighted", &v, "must be true or false"))?;
        }
        if let Some(v) = parse_value(section, "mosaic", "overlap", "must be one of: replace, etch, add")? {
            config.mosaic.overlap = v;
        }
    }

    // [inputs] section
    if let Some(section) = ini.section(Some("inputs")) {
        for (key, value) in section.iter() {
            config.inputs.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    // [resample] section
    if let Some(section) = ini.section(Some("resample")) {
        for (key, value) in section.iter() {
            let method = value
                .parse()
                .map_err(|_| invalid("resample", key, value, "must be one of: near, bilinear, mode, average"))?;
            config.resample.insert(key.trim().to_string(), method);
        }
    }

    // [outputs] section
    if let Some(section) = ini.section(Some("outputs")) {
        for (key, value) in section.iter() {
            let file_name = key.trim();
            if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == "." || file_name == ".." {
                return Err(invalid(
                    "outputs",
                    key,
                    value,
                    "output must be a file name in the job workspace (no path separators)",
                ));
            }
            let mosaic = value.trim();
            if mosaic.is_empty() || mosaic.contains(['/', '\\']) {
                return Err(invalid("outputs", key, value, "must name a mosaic (no path separators)"));
            }
            config.outputs.insert(file_name.to_string(), mosaic.to_string());
        }
    }

    // [model] section
    if let Some(section) = ini.section(Some("model")) {
        for (key, value) in section.iter() {
            let number = value
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid("model", key, value, "must be a number"))?;
            config.model.insert(key.trim().to_string(), number);
        }
    }

    // [catalog] section
    if let Some(section) = ini.section(Some("catalog")) {
        for (key, value) in section.iter() {
            config.catalog.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "file") {
            config.logging.file = Some(expand_tilde(&v));
        }
        if let Some(v) = non_empty(section, "level") {
            config.logging.level = v;
        }
    }

    Ok(config)
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::raster::{OverlapPolicy, ResampleMethod};
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_full_config() {
        let config = load(
            r#"
[workspace]
directory = /data/run

[partition]
watersheds = /data/watersheds
degree_separation = 2
singleton_area = 0.5
max_features_per_job = 500
subset = basins:3,basins:9

[executor]
max_parallel = 6
model_program = sdr-model
model_args = --mode global
target_pixel_size = 90

[stitch]
flush_threshold = 4

[mosaic]
pixel_size = 0.25
nodata = -9999
bounds = -20,-40,60,40
tile_size = 128
area_weighted = false
overlap = etch

[inputs]
dem = /data/dem.mosaic
lulc = catalog:ESA_LULC

[resample]
lulc = mode

[outputs]
sed_export.wgr = sed_export

[model]
threshold_flow_accumulation = 1000
k_param = 2.0

[catalog]
ESA_LULC = https://storage.googleapis.com/root/esa.tif
"#,
        )
        .unwrap();

        assert_eq!(config.workspace.directory, PathBuf::from("/data/run"));
        assert_eq!(config.partition.watersheds, Some(PathBuf::from("/data/watersheds")));
        assert_eq!(config.partition.degree_separation, 2);
        assert_eq!(config.partition.max_features_per_job, 500);
        assert_eq!(config.partition.subset.as_deref(), Some("basins:3,basins:9"));
        assert_eq!(config.executor.max_parallel, 6);
        assert_eq!(config.executor.model_args, vec!["--mode", "global"]);
        assert_eq!(config.executor.target_pixel_size, 90.0);
        assert_eq!(config.stitch.flush_threshold, 4);
        assert_eq!(config.mosaic.bounds, BoundingBox::new(-20.0, -40.0, 60.0, 40.0));
        assert!(!config.mosaic.area_weighted);
        assert_eq!(config.mosaic.overlap, OverlapPolicy::Etch);
        assert_eq!(config.inputs["lulc"], "catalog:ESA_LULC");
        assert_eq!(config.resample["lulc"], ResampleMethod::Mode);
        assert_eq!(config.outputs["sed_export.wgr"], "sed_export");
        assert_eq!(config.model["threshold_flow_accumulation"], 1000.0);
        assert_eq!(config.catalog.len(), 1);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = load("[stitch]\nflush_threshold = 3\n").unwrap();
        assert_eq!(config.stitch.flush_threshold, 3);
        assert_eq!(config.partition.degree_separation, crate::partition::DEFAULT_DEGREE_SEPARATION);
        assert_eq!(config.mosaic.pixel_size, DEFAULT_MOSAIC_PIXEL_SIZE);
        assert_eq!(config.mosaic.tile_size, DEFAULT_MOSAIC_TILE_SIZE);
        assert!(config.outputs.is_empty());
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let err = load("[mosaic]\noverlap = max\n").unwrap_err();
        assert!(err.to_string().contains("mosaic.overlap"));

        let err = load("[resample]\ndem = cubic\n").unwrap_err();
        assert!(err.to_string().contains("resample.dem"));

        let err = load("[model]\nk = high\n").unwrap_err();
        assert!(err.to_string().contains("must be a number"));

        let err = load("[partition]\nsubset = basins\n").unwrap_err();
        assert!(err.to_string().contains("partition.subset"));

        let err = load("[executor]\nmax_parallel = 0\n").unwrap_err();
        assert!(err.to_string().contains("executor.max_parallel"));
    }

    #[test]
    fn test_output_keys_must_be_plain_file_names() {
        let err = load("[outputs]\nintermediate/sed_export.wgr = sed_export\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { ref section, .. } if section == "outputs"));
        assert!(err.to_string().contains("outputs.intermediate/sed_export.wgr"));

        assert!(load("[outputs]\n.. = sed_export\n").is_err());

        let config = load("[outputs]\nsed_export.wgr = sed_export\n").unwrap();
        assert_eq!(config.outputs["sed_export.wgr"], "sed_export");
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/path");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join("test/path"));
        }

        // Non-tilde paths should be unchanged
        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }
}
