//! Folding job rasters into a global mosaic.
//!
//! Each source is inverse-sampled: for every mosaic pixel under the
//! source's geographic footprint, the pixel centre is projected into the
//! source CRS and sampled there. Tiles touched by a batch are loaded once,
//! updated by every source in order, and written once at the end.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::resample::{Footprint, SourceBlock};
use super::{GridRaster, MosaicStore, RasterError, ResampleMethod};
use crate::coord::{geographic_pixel_area_m2, reproject_bbox, transform_point, Crs};

/// How a sampled value combines with what the mosaic already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Last writer wins
    #[default]
    Replace,
    /// Only fill pixels that are still nodata
    Etch,
    /// Sum with the existing value; nodata counts as absent
    Add,
}

impl OverlapPolicy {
    #[inline]
    fn apply(&self, existing: f32, value: f32, nodata: f64) -> f32 {
        let empty = super::is_nodata(existing, nodata);
        match self {
            OverlapPolicy::Replace => value,
            OverlapPolicy::Etch if empty => value,
            OverlapPolicy::Etch => existing,
            OverlapPolicy::Add if empty => value,
            OverlapPolicy::Add => existing + value,
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlapPolicy::Replace => write!(f, "replace"),
            OverlapPolicy::Etch => write!(f, "etch"),
            OverlapPolicy::Add => write!(f, "add"),
        }
    }
}

impl FromStr for OverlapPolicy {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(OverlapPolicy::Replace),
            "etch" => Ok(OverlapPolicy::Etch),
            "add" => Ok(OverlapPolicy::Add),
            other => Err(RasterError::UnknownOverlapPolicy(other.to_string())),
        }
    }
}

/// One raster band to merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeSource {
    pub path: PathBuf,
    pub band: u32,
}

impl MergeSource {
    pub fn new(path: impl Into<PathBuf>, band: u32) -> Self {
        Self {
            path: path.into(),
            band,
        }
    }
}

/// Outcome of one merge batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub sources: usize,
    pub pixels_written: usize,
    pub tiles_written: usize,
}

/// Merges a batch of sources into band `band` of `target`.
///
/// # Arguments
///
/// * `sources` - Rasters to merge, applied in order
/// * `methods` - Resample method per source; the last entry is reused for
///   any remaining sources, and an empty list means nearest
/// * `target` - Mosaic store to update in place
/// * `band` - Target band (only band 1 exists)
/// * `area_weighted` - Scale values by target/source pixel area, for
///   rasters holding per-pixel totals
/// * `overlap` - How sampled values combine with existing ones
pub fn merge_into_mosaic(
    sources: &[MergeSource],
    methods: &[ResampleMethod],
    target: &MosaicStore,
    band: u32,
    area_weighted: bool,
    overlap: OverlapPolicy,
) -> Result<MergeStats, RasterError> {
    if band != 1 {
        return Err(RasterError::InvalidBand {
            path: target.path().to_path_buf(),
            band,
        });
    }

    let mut tiles: BTreeMap<(usize, usize), Vec<f32>> = BTreeMap::new();
    let mut dirty: BTreeSet<(usize, usize)> = BTreeSet::new();
    let mut stats = MergeStats::default();

    for (index, source) in sources.iter().enumerate() {
        if source.band != 1 {
            return Err(RasterError::InvalidBand {
                path: source.path.clone(),
                band: source.band,
            });
        }
        let method = methods
            .get(index)
            .or(methods.last())
            .copied()
            .unwrap_or_default();
        let raster = GridRaster::read(&source.path)?;
        stats.pixels_written +=
            merge_one(&raster, method, target, area_weighted, overlap, &mut tiles, &mut dirty)?;
        stats.sources += 1;
    }

    for key in &dirty {
        if let Some(tile) = tiles.get(key) {
            target.write_tile(key.0, key.1, tile)?;
        }
    }
    stats.tiles_written = dirty.len();

    tracing::debug!(
        mosaic = %target.path().display(),
        sources = stats.sources,
        pixels = stats.pixels_written,
        tiles = stats.tiles_written,
        "Merged batch into mosaic"
    );
    Ok(stats)
}

fn merge_one(
    raster: &GridRaster,
    method: ResampleMethod,
    target: &MosaicStore,
    area_weighted: bool,
    overlap: OverlapPolicy,
    tiles: &mut BTreeMap<(usize, usize), Vec<f32>>,
    dirty: &mut BTreeSet<(usize, usize)>,
) -> Result<usize, RasterError> {
    let spec = target.spec();
    let info = target.info();
    let ts = spec.tile_size;
    let ps = spec.pixel_size;
    let st = raster.transform;

    let geo_bbox = reproject_bbox(&raster.info().bbox, raster.crs, Crs::Geographic)?;
    let Some(overlap_bbox) = geo_bbox.intersection(&spec.bounds) else {
        tracing::warn!(
            bbox = %geo_bbox,
            "Source raster lies outside the mosaic bounds, skipping"
        );
        return Ok(0);
    };

    let col_start = ((overlap_bbox.min_x - spec.bounds.min_x) / ps).floor().max(0.0) as usize;
    let col_end = (((overlap_bbox.max_x - spec.bounds.min_x) / ps).ceil() as usize).min(info.width);
    let row_start = ((spec.bounds.max_y - overlap_bbox.max_y) / ps).floor().max(0.0) as usize;
    let row_end = (((spec.bounds.max_y - overlap_bbox.min_y) / ps).ceil() as usize).min(info.height);

    let block = SourceBlock {
        data: &raster.data,
        col0: 0,
        row0: 0,
        width: raster.width,
        height: raster.height,
        nodata: raster.nodata,
    };
    let projected_source_area = st.pixel_area();

    let mut written = 0;
    for row in row_start..row_end {
        let lat_top = spec.bounds.max_y - row as f64 * ps;
        let lat_bottom = lat_top - ps;
        let target_area = geographic_pixel_area_m2(lat_top, lat_bottom, ps);

        for col in col_start..col_end {
            let lon_left = spec.bounds.min_x + col as f64 * ps;
            let footprint = if method.uses_footprint() {
                let mut fp = Footprint {
                    col_min: f64::INFINITY,
                    row_min: f64::INFINITY,
                    col_max: f64::NEG_INFINITY,
                    row_max: f64::NEG_INFINITY,
                };
                for (lon, lat) in [
                    (lon_left, lat_top),
                    (lon_left + ps, lat_top),
                    (lon_left, lat_bottom),
                    (lon_left + ps, lat_bottom),
                ] {
                    let (x, y) = transform_point(lon, lat, Crs::Geographic, raster.crs)?;
                    let (c, r) = st.to_pixel(x, y);
                    fp.col_min = fp.col_min.min(c);
                    fp.row_min = fp.row_min.min(r);
                    fp.col_max = fp.col_max.max(c);
                    fp.row_max = fp.row_max.max(r);
                }
                fp
            } else {
                let (x, y) = transform_point(
                    lon_left + ps / 2.0,
                    lat_top - ps / 2.0,
                    Crs::Geographic,
                    raster.crs,
                )?;
                let (c, r) = st.to_pixel(x, y);
                Footprint {
                    col_min: c,
                    row_min: r,
                    col_max: c,
                    row_max: r,
                }
            };

            let Some(mut value) = block.sample(method, &footprint) else {
                continue;
            };
            if area_weighted {
                let source_area = if raster.crs.is_geographic() {
                    let src_row = footprint.center().1.floor();
                    let src_top = st.origin_y + src_row * st.pixel_height;
                    geographic_pixel_area_m2(src_top, src_top + st.pixel_height, st.pixel_width)
                } else {
                    projected_source_area
                };
                if source_area > 0.0 {
                    value = (value as f64 * target_area / source_area) as f32;
                }
            }

            let key = (row / ts, col / ts);
            let tile = match tiles.entry(key) {
                std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::btree_map::Entry::Vacant(e) => e.insert(target.load_tile(key.0, key.1)?),
            };
            let idx = (row % ts) * ts + (col % ts);
            tile[idx] = overlap.apply(tile[idx], value, spec.nodata);
            dirty.insert(key);
            written += 1;
        }
    }
    Ok(written)
}
