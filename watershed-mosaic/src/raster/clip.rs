//! Align-and-resample of a (global) raster to a job's bounding box.

use std::path::Path;

use super::resample::{Footprint, SourceBlock};
use super::{GeoTransform, GridRaster, PixelWindow, RasterError, RasterInfo, RasterSource, ResampleMethod};
use crate::coord::BoundingBox;

/// Tolerance for snapping fractional pixel positions onto the grid.
const SNAP_EPSILON: f64 = 1e-9;

/// Clips `source` to `bbox`, resamples it and writes the result to `target`.
///
/// # Arguments
///
/// * `source` - Raster to read from; only the pixels under `bbox` are read
/// * `bbox` - Area to keep, in the source's CRS
/// * `pixel_size` - Output pixel size in source units, or `None` to keep
///   the source resolution
/// * `method` - How source pixels are combined
/// * `target` - Output `.wgr` path
///
/// The output grid is aligned to the source grid: its origin lies on a
/// multiple of the output pixel size from the source origin.
pub fn clip_to_bbox(
    source: &dyn RasterSource,
    bbox: &BoundingBox,
    pixel_size: Option<f64>,
    method: ResampleMethod,
    target: &Path,
) -> Result<RasterInfo, RasterError> {
    let clipped = clip_raster(source, bbox, pixel_size, method, target)?;
    clipped.write(target)?;
    tracing::debug!(
        target = %target.display(),
        width = clipped.width,
        height = clipped.height,
        method = %method,
        "Clipped raster"
    );
    Ok(clipped.info())
}

fn clip_raster(
    source: &dyn RasterSource,
    bbox: &BoundingBox,
    pixel_size: Option<f64>,
    method: ResampleMethod,
    target: &Path,
) -> Result<GridRaster, RasterError> {
    let info = source.info();
    let overlap = bbox
        .intersection(&info.bbox)
        .ok_or_else(|| RasterError::NoOverlap {
            path: target.to_path_buf(),
            bbox: *bbox,
        })?;
    let t = info.transform;

    // Overlap in fractional source pixel coordinates
    let (ca, ra) = t.to_pixel(overlap.min_x, overlap.max_y);
    let (cb, rb) = t.to_pixel(overlap.max_x, overlap.min_y);
    let (c_lo, c_hi) = (ca.min(cb), ca.max(cb));
    let (r_lo, r_hi) = (ra.min(rb), ra.max(rb));

    // Output pixel size in source pixels
    let (sx, sy) = match pixel_size {
        Some(p) if p > 0.0 => (p / t.pixel_width.abs(), p / t.pixel_height.abs()),
        Some(p) => {
            return Err(RasterError::InvalidSpec(format!(
                "pixel size must be positive, got {}",
                p
            )))
        }
        None => (1.0, 1.0),
    };

    let c_start = ((c_lo / sx) + SNAP_EPSILON).floor() * sx;
    let r_start = ((r_lo / sy) + SNAP_EPSILON).floor() * sy;
    let width = (((c_hi - c_start) / sx) - SNAP_EPSILON).ceil().max(1.0) as usize;
    let height = (((r_hi - r_start) / sy) - SNAP_EPSILON).ceil().max(1.0) as usize;

    let transform = GeoTransform::new(
        t.origin_x + c_start * t.pixel_width,
        sx * t.pixel_width,
        t.origin_y + r_start * t.pixel_height,
        sy * t.pixel_height,
    );
    let mut out = GridRaster::filled(width, height, transform, info.nodata, info.crs);

    let margin = method.margin();
    let col0 = c_start.floor() as i64 - margin;
    let row0 = r_start.floor() as i64 - margin;
    let col1 = (c_start + width as f64 * sx).ceil() as i64 + margin;
    let row1 = (r_start + height as f64 * sy).ceil() as i64 + margin;
    let window = PixelWindow::new(col0, row0, (col1 - col0) as usize, (row1 - row0) as usize);
    let data = source.read_window(window)?;
    let block = SourceBlock {
        data: &data,
        col0,
        row0,
        width: window.width,
        height: window.height,
        nodata: info.nodata,
    };

    for row in 0..height {
        for col in 0..width {
            let footprint = Footprint {
                col_min: c_start + col as f64 * sx,
                row_min: r_start + row as f64 * sy,
                col_max: c_start + (col + 1) as f64 * sx,
                row_max: r_start + (row + 1) as f64 * sy,
            };
            if let Some(v) = block.sample(method, &footprint) {
                out.set(col, row, v);
            }
        }
    }
    Ok(out)
}
