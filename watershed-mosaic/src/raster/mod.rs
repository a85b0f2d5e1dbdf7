//! Raster storage, resampling and mosaicking.
//!
//! Two storage formats are supported:
//!
//! - [`GridRaster`] (`.wgr`): small, job-scale rasters held in memory
//! - [`MosaicStore`] (`<name>.mosaic/`): global rasters split into sparse,
//!   compressed tiles so they are never held in memory as a whole
//!
//! On top of those sit the two primitives the pipeline depends on:
//! [`clip_to_bbox`] (align-and-resample a global input to a job) and
//! [`merge_into_mosaic`] (fold job outputs into a global mosaic).

mod clip;
mod grid;
mod merge;
mod resample;
mod store;

pub use clip::clip_to_bbox;
pub use grid::{grid_info, GridRaster, GRID_EXTENSION, GRID_MAGIC};
pub use merge::{merge_into_mosaic, MergeSource, MergeStats, OverlapPolicy};
pub use resample::ResampleMethod;
pub use store::{MosaicSpec, MosaicStore, MOSAIC_EXTENSION, MOSAIC_HEADER_FILE};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::coord::{BoundingBox, CoordError, Crs};

/// Errors from raster I/O and raster operations.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error on a raster file or store
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File exists but is not a valid raster
    #[error("invalid raster {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// Only single-band rasters exist
    #[error("{path} has no band {band}")]
    InvalidBand { path: PathBuf, band: u32 },

    /// Source does not overlap the requested area
    #[error("{path} does not overlap {bbox}")]
    NoOverlap { path: PathBuf, bbox: BoundingBox },

    /// Unknown resample method name
    #[error("unknown resample method '{0}'")]
    UnknownResampleMethod(String),

    /// Unknown overlap policy name
    #[error("unknown overlap policy '{0}'")]
    UnknownOverlapPolicy(String),

    /// Mosaic parameters are unusable
    #[error("invalid mosaic specification: {0}")]
    InvalidSpec(String),

    /// Coordinate transform failed
    #[error(transparent)]
    Coord(#[from] CoordError),
}

/// Affine north-up geotransform.
///
/// Pixel `(col, row)` covers `[origin_x + col * pixel_width, ...)` and
/// `[origin_y + row * pixel_height, ...)`; `pixel_height` is negative for
/// north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub origin_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, pixel_width: f64, origin_y: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            origin_y,
            pixel_height,
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.origin_x, self.pixel_width, self.origin_y, self.pixel_height]
    }

    pub fn from_array(a: [f64; 4]) -> Self {
        Self::new(a[0], a[1], a[2], a[3])
    }

    /// World coordinates of a pixel centre.
    #[inline]
    pub fn pixel_center(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + (col + 0.5) * self.pixel_width,
            self.origin_y + (row + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates of a world point. Pixel `(c, r)` spans
    /// `[c, c + 1) x [r, r + 1)` in this space.
    #[inline]
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Extent covered by a `width` x `height` grid.
    pub fn bbox(&self, width: usize, height: usize) -> BoundingBox {
        let x0 = self.origin_x;
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Area of one pixel in CRS units squared.
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }
}

/// A rectangular block of pixels. Offsets may be negative or run past the
/// raster edge; such pixels read as nodata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: i64,
    pub row: i64,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col: i64, row: i64, width: usize, height: usize) -> Self {
        Self {
            col,
            row,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Raster metadata shared by both storage formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: f64,
    pub crs: Crs,
    pub bbox: BoundingBox,
}

impl RasterInfo {
    pub fn new(width: usize, height: usize, transform: GeoTransform, nodata: f64, crs: Crs) -> Self {
        Self {
            width,
            height,
            transform,
            nodata,
            crs,
            bbox: transform.bbox(width, height),
        }
    }
}

/// Anything that can serve windows of a single-band raster.
pub trait RasterSource {
    fn info(&self) -> RasterInfo;

    /// Reads a window in row-major order, nodata outside the raster.
    fn read_window(&self, window: PixelWindow) -> Result<Vec<f32>, RasterError>;
}

/// True for NaN or values equal to `nodata`.
#[inline]
pub fn is_nodata(value: f32, nodata: f64) -> bool {
    value.is_nan() || value == nodata as f32
}

/// Opens either a mosaic store directory or a `.wgr` file.
pub fn open_raster(path: &Path) -> Result<Box<dyn RasterSource + Send + Sync>, RasterError> {
    if path.join(MOSAIC_HEADER_FILE).is_file() {
        Ok(Box::new(MosaicStore::open(path)?))
    } else {
        Ok(Box::new(GridRaster::read(path)?))
    }
}

/// Metadata of either raster format without reading pixel data.
pub fn raster_info(path: &Path) -> Result<RasterInfo, RasterError> {
    if path.join(MOSAIC_HEADER_FILE).is_file() {
        Ok(MosaicStore::open(path)?.info())
    } else {
        grid_info(path)
    }
}

pub(crate) fn encode_f32(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub(crate) fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
