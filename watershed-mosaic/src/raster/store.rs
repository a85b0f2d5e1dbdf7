//! Sparse tiled mosaic store.
//!
//! A global raster too large to hold in memory is stored as a directory:
//!
//! ```text
//! <name>.mosaic/
//! ├── mosaic.json          # bounds, pixel size, nodata, tile size, grid size
//! └── tiles/
//!     └── <row>/
//!         └── <col>.z      # zlib-compressed f32 LE tile, tile_size²
//! ```
//!
//! Tiles that have never been written do not exist and read as nodata, so a
//! freshly created store costs one small JSON file regardless of its extent.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use super::{GeoTransform, PixelWindow, RasterError, RasterInfo, RasterSource};
use crate::coord::{BoundingBox, Crs};

/// Header file name inside a store directory.
pub const MOSAIC_HEADER_FILE: &str = "mosaic.json";

/// Directory extension for mosaic stores.
pub const MOSAIC_EXTENSION: &str = "mosaic";

const TILES_DIR: &str = "tiles";
const TILE_EXTENSION: &str = "z";

/// Fixed parameters of a global mosaic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MosaicSpec {
    /// Geographic extent (degrees)
    pub bounds: BoundingBox,
    /// Pixel size (degrees)
    pub pixel_size: f64,
    pub nodata: f64,
    /// Tile edge length in pixels
    pub tile_size: usize,
}

impl MosaicSpec {
    pub fn new(bounds: BoundingBox, pixel_size: f64, nodata: f64, tile_size: usize) -> Self {
        Self {
            bounds,
            pixel_size,
            nodata,
            tile_size,
        }
    }

    pub fn validate(&self) -> Result<(), RasterError> {
        if !(self.pixel_size > 0.0 && self.pixel_size.is_finite()) {
            return Err(RasterError::InvalidSpec(format!(
                "pixel size must be positive, got {}",
                self.pixel_size
            )));
        }
        if self.tile_size == 0 {
            return Err(RasterError::InvalidSpec("tile size must be positive".into()));
        }
        if self.bounds.is_empty() || self.bounds.width() <= 0.0 || self.bounds.height() <= 0.0 {
            return Err(RasterError::InvalidSpec(format!(
                "bounds {} are empty",
                self.bounds
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        (self.bounds.width() / self.pixel_size).round() as usize
    }

    pub fn height(&self) -> usize {
        (self.bounds.height() / self.pixel_size).round() as usize
    }

    pub fn transform(&self) -> GeoTransform {
        GeoTransform::new(
            self.bounds.min_x,
            self.pixel_size,
            self.bounds.max_y,
            -self.pixel_size,
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MosaicHeader {
    bounds: [f64; 4],
    pixel_size: f64,
    nodata: f64,
    tile_size: usize,
    width: usize,
    height: usize,
    epsg: u32,
}

/// Handle on a mosaic store directory.
#[derive(Debug, Clone)]
pub struct MosaicStore {
    root: PathBuf,
    spec: MosaicSpec,
    width: usize,
    height: usize,
}

impl MosaicStore {
    /// Creates the store unless it already exists.
    ///
    /// Returns the store and whether it was created. An existing store is
    /// reused as-is, even if `spec` differs from what it was created with.
    pub fn create_if_absent(root: &Path, spec: MosaicSpec) -> Result<(Self, bool), RasterError> {
        if root.join(MOSAIC_HEADER_FILE).is_file() {
            let store = Self::open(root)?;
            if store.spec != spec {
                tracing::warn!(
                    mosaic = %root.display(),
                    "Existing mosaic differs from configuration, keeping existing parameters"
                );
            }
            return Ok((store, false));
        }

        spec.validate()?;
        let io_err = |source| RasterError::Io {
            path: root.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(root.join(TILES_DIR)).map_err(io_err)?;

        let header = MosaicHeader {
            bounds: [
                spec.bounds.min_x,
                spec.bounds.min_y,
                spec.bounds.max_x,
                spec.bounds.max_y,
            ],
            pixel_size: spec.pixel_size,
            nodata: spec.nodata,
            tile_size: spec.tile_size,
            width: spec.width(),
            height: spec.height(),
            epsg: Crs::Geographic.epsg(),
        };
        let bytes = serde_json::to_vec_pretty(&header).map_err(|e| RasterError::Format {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;
        write_atomic(&root.join(MOSAIC_HEADER_FILE), &bytes)?;

        tracing::info!(
            mosaic = %root.display(),
            width = header.width,
            height = header.height,
            "Created global mosaic"
        );
        Ok((
            Self {
                root: root.to_path_buf(),
                spec,
                width: header.width,
                height: header.height,
            },
            true,
        ))
    }

    /// Opens an existing store.
    pub fn open(root: &Path) -> Result<Self, RasterError> {
        let header_path = root.join(MOSAIC_HEADER_FILE);
        let bytes = std::fs::read(&header_path).map_err(|source| RasterError::Io {
            path: header_path.clone(),
            source,
        })?;
        let header: MosaicHeader = serde_json::from_slice(&bytes).map_err(|e| RasterError::Format {
            path: header_path.clone(),
            message: e.to_string(),
        })?;
        if header.epsg != Crs::Geographic.epsg() {
            return Err(RasterError::Format {
                path: header_path,
                message: format!("mosaic CRS must be EPSG:4326, found EPSG:{}", header.epsg),
            });
        }
        let [min_x, min_y, max_x, max_y] = header.bounds;
        let spec = MosaicSpec::new(
            BoundingBox::new(min_x, min_y, max_x, max_y),
            header.pixel_size,
            header.nodata,
            header.tile_size,
        );
        spec.validate()?;
        Ok(Self {
            root: root.to_path_buf(),
            spec,
            width: header.width,
            height: header.height,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn spec(&self) -> &MosaicSpec {
        &self.spec
    }

    pub fn nodata(&self) -> f32 {
        self.spec.nodata as f32
    }

    pub fn tile_size(&self) -> usize {
        self.spec.tile_size
    }

    /// Number of tile columns and rows.
    pub fn tile_grid(&self) -> (usize, usize) {
        let ts = self.spec.tile_size;
        (self.width.div_ceil(ts), self.height.div_ceil(ts))
    }

    pub fn tile_path(&self, tile_row: usize, tile_col: usize) -> PathBuf {
        self.root
            .join(TILES_DIR)
            .join(tile_row.to_string())
            .join(format!("{}.{}", tile_col, TILE_EXTENSION))
    }

    /// Reads a tile, or `None` if it was never written.
    pub fn read_tile(&self, tile_row: usize, tile_col: usize) -> Result<Option<Vec<f32>>, RasterError> {
        let path = self.tile_path(tile_row, tile_col);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(RasterError::Io { path, source }),
        };
        let mut bytes = Vec::new();
        ZlibDecoder::new(file)
            .read_to_end(&mut bytes)
            .map_err(|source| RasterError::Io {
                path: path.clone(),
                source,
            })?;
        let tile = super::decode_f32(&bytes);
        let expected = self.spec.tile_size * self.spec.tile_size;
        if tile.len() != expected {
            return Err(RasterError::Format {
                path,
                message: format!("tile has {} values, expected {}", tile.len(), expected),
            });
        }
        Ok(Some(tile))
    }

    /// Reads a tile, substituting an all-nodata tile if it was never written.
    pub fn load_tile(&self, tile_row: usize, tile_col: usize) -> Result<Vec<f32>, RasterError> {
        Ok(self
            .read_tile(tile_row, tile_col)?
            .unwrap_or_else(|| vec![self.nodata(); self.spec.tile_size * self.spec.tile_size]))
    }

    /// Writes a tile through a temp file and rename.
    pub fn write_tile(&self, tile_row: usize, tile_col: usize, tile: &[f32]) -> Result<(), RasterError> {
        let path = self.tile_path(tile_row, tile_col);
        let expected = self.spec.tile_size * self.spec.tile_size;
        if tile.len() != expected {
            return Err(RasterError::Format {
                path,
                message: format!("tile has {} values, expected {}", tile.len(), expected),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RasterError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        let io_err = |source| RasterError::Io {
            path: path.clone(),
            source,
        };
        encoder.write_all(&super::encode_f32(tile)).map_err(io_err)?;
        let compressed = encoder.finish().map_err(io_err)?;
        write_atomic(&path, &compressed)
    }

    /// Number of tiles present on disk.
    pub fn written_tiles(&self) -> Result<usize, RasterError> {
        let tiles_dir = self.root.join(TILES_DIR);
        let rows = match std::fs::read_dir(&tiles_dir) {
            Ok(rows) => rows,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(RasterError::Io {
                    path: tiles_dir,
                    source,
                })
            }
        };
        let mut count = 0;
        for row in rows.flatten().filter(|e| e.path().is_dir()) {
            let entries = std::fs::read_dir(row.path()).map_err(|source| RasterError::Io {
                path: row.path(),
                source,
            })?;
            count += entries
                .flatten()
                .filter(|e| {
                    e.path()
                        .extension()
                        .map(|ext| ext == TILE_EXTENSION)
                        .unwrap_or(false)
                })
                .count();
        }
        Ok(count)
    }

    pub fn info(&self) -> RasterInfo {
        RasterInfo::new(
            self.width,
            self.height,
            self.spec.transform(),
            self.spec.nodata,
            Crs::Geographic,
        )
    }
}

impl RasterSource for MosaicStore {
    fn info(&self) -> RasterInfo {
        MosaicStore::info(self)
    }

    fn read_window(&self, window: PixelWindow) -> Result<Vec<f32>, RasterError> {
        let mut out = vec![self.nodata(); window.width * window.height];
        if window.is_empty() {
            return Ok(out);
        }
        let ts = self.spec.tile_size as i64;

        // Window clipped to the raster
        let c0 = window.col.max(0);
        let r0 = window.row.max(0);
        let c1 = (window.col + window.width as i64).min(self.width as i64);
        let r1 = (window.row + window.height as i64).min(self.height as i64);
        if c0 >= c1 || r0 >= r1 {
            return Ok(out);
        }

        for tile_row in (r0 / ts)..=((r1 - 1) / ts) {
            for tile_col in (c0 / ts)..=((c1 - 1) / ts) {
                let Some(tile) = self.read_tile(tile_row as usize, tile_col as usize)? else {
                    continue;
                };
                let row_start = (tile_row * ts).max(r0);
                let row_end = ((tile_row + 1) * ts).min(r1);
                let col_start = (tile_col * ts).max(c0);
                let col_end = ((tile_col + 1) * ts).min(c1);
                for row in row_start..row_end {
                    let tile_offset = ((row - tile_row * ts) * ts) as usize;
                    let out_offset = ((row - window.row) as usize) * window.width;
                    for col in col_start..col_end {
                        out[out_offset + (col - window.col) as usize] =
                            tile[tile_offset + (col - tile_col * ts) as usize];
                    }
                }
            }
        }
        Ok(out)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RasterError> {
    let io_err = |source| RasterError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    {
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    std::fs::rename(&tmp, path).map_err(io_err)
}
