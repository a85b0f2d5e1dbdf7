//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented INI representation written to `config.ini`.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

use super::settings::ConfigFile;

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn map_section<V: Display>(map: &BTreeMap<String, V>, example: &str) -> String {
    if map.is_empty() {
        return format!("{}\n", example);
    }
    map.iter()
        .map(|(k, v)| format!("{} = {}\n", k, v))
        .collect()
}

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let watersheds = config
        .partition
        .watersheds
        .as_deref()
        .map(path_to_string)
        .unwrap_or_default();
    let mosaic_dir = config
        .mosaic
        .directory
        .as_deref()
        .map(path_to_string)
        .unwrap_or_default();
    let log_file = config
        .logging
        .file
        .as_deref()
        .map(path_to_string)
        .unwrap_or_default();

    format!(
        r#"[workspace]
; Run workspace: subset files, job workspaces, completion ledger, log file
directory = {workspace}

[partition]
; Directory of GeoJSON watershed collections (one collection per file)
watersheds = {watersheds}
; Grid cell size in degrees used to group small watersheds into jobs
degree_separation = {degree_separation}
; Watersheds larger than this (input units, e.g. degrees²) get their own job
singleton_area = {singleton_area}
; Maximum watersheds per grouped job
max_features_per_job = {max_features}
; Optional comma-separated collection:fid pairs to restrict the run to
subset = {subset}

[executor]
; Maximum jobs running at once
max_parallel = {max_parallel}
; Program run once per job; receives the path of model_config.json last
model_program = {model_program}
model_args = {model_args}
; Output pixel size in target projection units (metres for UTM)
target_pixel_size = {target_pixel_size}

[stitch]
; Buffered job outputs that trigger a mosaic merge (queues hold twice this)
flush_threshold = {flush_threshold}

[mosaic]
; Directory of <name>.mosaic stores (default: <workspace>/mosaics)
directory = {mosaic_dir}
; Pixel size in degrees (1/360 = 10 arc-seconds)
pixel_size = {pixel_size}
nodata = {nodata}
; min_lon,min_lat,max_lon,max_lat
bounds = {bounds}
tile_size = {tile_size}
; Scale values by pixel area when merging (for per-pixel totals)
area_weighted = {area_weighted}
; Overlap policy: replace (last writer wins), etch (fill nodata only), add
overlap = {overlap}

[inputs]
; <name> = <path to .wgr or .mosaic> | catalog:<catalog entry>
{inputs}
[resample]
; <input name> = near | bilinear | mode | average
{resample}
[outputs]
; <file written by the model> = <mosaic name>
{outputs}
[model]
; Parameters passed to the model verbatim
{model}
[catalog]
; <dataset name> = <url> | <path> | <free-text placeholder>
{catalog}
[logging]
; Log file (default: <workspace>/watershed-mosaic.log)
file = {log_file}
; Default filter when RUST_LOG is unset
level = {level}
"#,
        workspace = path_to_string(&config.workspace.directory),
        watersheds = watersheds,
        degree_separation = config.partition.degree_separation,
        singleton_area = config.partition.singleton_area,
        max_features = config.partition.max_features_per_job,
        subset = config.partition.subset.as_deref().unwrap_or(""),
        max_parallel = config.executor.max_parallel,
        model_program = config.executor.model_program.as_deref().unwrap_or(""),
        model_args = config.executor.model_args.join(" "),
        target_pixel_size = config.executor.target_pixel_size,
        flush_threshold = config.stitch.flush_threshold,
        mosaic_dir = mosaic_dir,
        pixel_size = config.mosaic.pixel_size,
        nodata = config.mosaic.nodata,
        bounds = config.mosaic.bounds,
        tile_size = config.mosaic.tile_size,
        area_weighted = config.mosaic.area_weighted,
        overlap = config.mosaic.overlap,
        inputs = map_section(&config.inputs, "; dem = /data/dem.mosaic"),
        resample = map_section(&config.resample, "; lulc = mode"),
        outputs = map_section(&config.outputs, "; sed_export.wgr = sed_export"),
        model = map_section(&config.model, "; threshold_flow_accumulation = 1000"),
        catalog = map_section(&config.catalog, "; DEM = https://example.org/global_dem.tif"),
        log_file = log_file,
        level = config.logging.level,
    )
}

#[cfg(test)]
mod tests {
    use crate::config::ConfigFile;
    use crate::raster::ResampleMethod;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_survives_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        let config = ConfigFile::default();
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_maps_are_written() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        let mut config = ConfigFile::default();
        config.inputs.insert("lulc".into(), "catalog:ESA".into());
        config.resample.insert("lulc".into(), ResampleMethod::Mode);
        config.outputs.insert("sed_export.wgr".into(), "sed_export".into());
        config.model.insert("k".into(), 2.5);
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.inputs, config.inputs);
        assert_eq!(loaded.resample, config.resample);
        assert_eq!(loaded.outputs, config.outputs);
        assert_eq!(loaded.model, config.model);
    }
}
