//! In-memory single-band rasters and the `.wgr` file format.
//!
//! # File layout
//!
//! ```text
//! ┌──────────┬────────────────┬──────────────┬──────────────────────────┐
//! │ "WGR1"   │ header len u32 │ JSON header  │ zlib(f32 LE row-major)   │
//! └──────────┴────────────────┴──────────────┴──────────────────────────┘
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use super::{GeoTransform, PixelWindow, RasterError, RasterInfo, RasterSource};
use crate::coord::Crs;

/// Magic bytes at the start of every grid raster file.
pub const GRID_MAGIC: &[u8; 4] = b"WGR1";

/// File extension for grid rasters.
pub const GRID_EXTENSION: &str = "wgr";

/// Largest JSON header accepted when reading.
const MAX_HEADER_LEN: usize = 64 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct GridHeader {
    width: usize,
    height: usize,
    transform: [f64; 4],
    nodata: f64,
    epsg: u32,
}

/// A single-band f32 raster held fully in memory.
///
/// Used for job-scale data only: clipped inputs and model outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRaster {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: f64,
    pub crs: Crs,
    pub data: Vec<f32>,
}

impl GridRaster {
    /// Creates a raster filled with nodata.
    pub fn filled(width: usize, height: usize, transform: GeoTransform, nodata: f64, crs: Crs) -> Self {
        Self {
            width,
            height,
            transform,
            nodata,
            crs,
            data: vec![nodata as f32; width * height],
        }
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, col: usize, row: usize, value: f32) {
        self.data[row * self.width + col] = value;
    }

    pub fn is_nodata(&self, value: f32) -> bool {
        super::is_nodata(value, self.nodata)
    }

    pub fn info(&self) -> RasterInfo {
        RasterInfo::new(self.width, self.height, self.transform, self.nodata, self.crs)
    }

    /// Count of pixels holding data.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Writes the raster to a `.wgr` file.
    pub fn write(&self, path: &Path) -> Result<(), RasterError> {
        let io_err = |source| RasterError::Io {
            path: path.to_path_buf(),
            source,
        };
        if self.data.len() != self.width * self.height {
            return Err(RasterError::Format {
                path: path.to_path_buf(),
                message: format!(
                    "buffer has {} values for {}x{}",
                    self.data.len(),
                    self.width,
                    self.height
                ),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let header = GridHeader {
            width: self.width,
            height: self.height,
            transform: self.transform.to_array(),
            nodata: self.nodata,
            epsg: self.crs.epsg(),
        };
        let header_bytes = serde_json::to_vec(&header).map_err(|e| RasterError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let tmp = path.with_extension("wgr.tmp");
        {
            let file = File::create(&tmp).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(GRID_MAGIC).map_err(io_err)?;
            writer
                .write_all(&(header_bytes.len() as u32).to_le_bytes())
                .map_err(io_err)?;
            writer.write_all(&header_bytes).map_err(io_err)?;
            let mut encoder = ZlibEncoder::new(writer, Compression::default());
            encoder
                .write_all(&super::encode_f32(&self.data))
                .map_err(io_err)?;
            encoder.finish().map_err(io_err)?.flush().map_err(io_err)?;
        }
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    /// Reads a `.wgr` file.
    pub fn read(path: &Path) -> Result<Self, RasterError> {
        let (header, mut reader) = read_header(path)?;
        let crs = Crs::from_epsg(header.epsg).map_err(|e| RasterError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut decoder = ZlibDecoder::new(&mut reader);
        let expected = header.width.checked_mul(header.height).ok_or_else(|| RasterError::Format {
            path: path.to_path_buf(),
            message: format!("grid size {}x{} overflows", header.width, header.height),
        })?;
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes).map_err(|source| RasterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data = super::decode_f32(&bytes);
        if data.len() != expected {
            return Err(RasterError::Format {
                path: path.to_path_buf(),
                message: format!(
                    "body has {} values for {}x{}",
                    data.len(),
                    header.width,
                    header.height
                ),
            });
        }

        Ok(Self {
            width: header.width,
            height: header.height,
            transform: GeoTransform::from_array(header.transform),
            nodata: header.nodata,
            crs,
            data,
        })
    }
}

fn read_header(path: &Path) -> Result<(GridHeader, BufReader<File>), RasterError> {
    let io_err = |source| RasterError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(io_err)?;
    if &magic != GRID_MAGIC {
        return Err(RasterError::Format {
            path: path.to_path_buf(),
            message: "not a grid raster (bad magic)".to_string(),
        });
    }
    let mut len = [0u8; 4];
    reader.read_exact(&mut len).map_err(io_err)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_HEADER_LEN {
        return Err(RasterError::Format {
            path: path.to_path_buf(),
            message: format!("header length {} exceeds {} bytes", len, MAX_HEADER_LEN),
        });
    }
    let mut header_bytes = vec![0u8; len];
    reader.read_exact(&mut header_bytes).map_err(io_err)?;
    let header: GridHeader = serde_json::from_slice(&header_bytes).map_err(|e| RasterError::Format {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok((header, reader))
}

/// Reads only the header of a `.wgr` file.
pub fn grid_info(path: &Path) -> Result<RasterInfo, RasterError> {
    let (header, _) = read_header(path)?;
    let crs = Crs::from_epsg(header.epsg).map_err(|e| RasterError::Format {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(RasterInfo::new(
        header.width,
        header.height,
        GeoTransform::from_array(header.transform),
        header.nodata,
        crs,
    ))
}

impl RasterSource for GridRaster {
    fn info(&self) -> RasterInfo {
        GridRaster::info(self)
    }

    fn read_window(&self, window: PixelWindow) -> Result<Vec<f32>, RasterError> {
        let mut out = vec![self.nodata as f32; window.width * window.height];
        for r in 0..window.height {
            let src_row = window.row + r as i64;
            if src_row < 0 || src_row >= self.height as i64 {
                continue;
            }
            for c in 0..window.width {
                let src_col = window.col + c as i64;
                if src_col < 0 || src_col >= self.width as i64 {
                    continue;
                }
                out[r * window.width + c] = self.get(src_col as usize, src_row as usize);
            }
        }
        Ok(out)
    }
}
