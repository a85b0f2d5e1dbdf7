//! Resampling kernels.
//!
//! All kernels work in fractional source-pixel coordinates, where pixel
//! `(c, r)` spans `[c, c + 1) x [r, r + 1)` and its centre is at
//! `(c + 0.5, r + 0.5)`. Nodata never contributes to a result.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::RasterError;

/// How source pixels are combined into a target pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResampleMethod {
    /// Source pixel containing the target centre
    #[default]
    Nearest,
    /// Distance-weighted blend of the four surrounding pixel centres
    Bilinear,
    /// Most frequent value in the footprint (categorical data)
    Mode,
    /// Mean of the values in the footprint
    Average,
}

impl ResampleMethod {
    /// Whether the method aggregates over a footprint rather than sampling
    /// at a point.
    pub fn uses_footprint(&self) -> bool {
        matches!(self, ResampleMethod::Mode | ResampleMethod::Average)
    }

    /// Extra source pixels to read around a footprint.
    pub(crate) fn margin(&self) -> i64 {
        match self {
            ResampleMethod::Bilinear => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResampleMethod::Nearest => "near",
            ResampleMethod::Bilinear => "bilinear",
            ResampleMethod::Mode => "mode",
            ResampleMethod::Average => "average",
        };
        f.write_str(name)
    }
}

impl FromStr for ResampleMethod {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "near" | "nearest" => Ok(ResampleMethod::Nearest),
            "bilinear" => Ok(ResampleMethod::Bilinear),
            "mode" | "majority" => Ok(ResampleMethod::Mode),
            "average" | "mean" => Ok(ResampleMethod::Average),
            other => Err(RasterError::UnknownResampleMethod(other.to_string())),
        }
    }
}

/// Target pixel footprint in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Footprint {
    pub col_min: f64,
    pub row_min: f64,
    pub col_max: f64,
    pub row_max: f64,
}

impl Footprint {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.col_min + self.col_max) / 2.0,
            (self.row_min + self.row_max) / 2.0,
        )
    }
}

/// A block of source pixels read into memory, addressed in source pixel
/// coordinates.
pub(crate) struct SourceBlock<'a> {
    pub data: &'a [f32],
    pub col0: i64,
    pub row0: i64,
    pub width: usize,
    pub height: usize,
    pub nodata: f64,
}

impl SourceBlock<'_> {
    /// Valid value at an absolute source pixel, or `None` for nodata and
    /// pixels outside the block.
    #[inline]
    pub fn get(&self, col: i64, row: i64) -> Option<f32> {
        let c = col - self.col0;
        let r = row - self.row0;
        if c < 0 || r < 0 || c >= self.width as i64 || r >= self.height as i64 {
            return None;
        }
        let v = self.data[r as usize * self.width + c as usize];
        if super::is_nodata(v, self.nodata) {
            None
        } else {
            Some(v)
        }
    }

    /// Samples one target pixel.
    pub fn sample(&self, method: ResampleMethod, footprint: &Footprint) -> Option<f32> {
        let (cx, cy) = footprint.center();
        match method {
            ResampleMethod::Nearest => self.nearest(cx, cy),
            ResampleMethod::Bilinear => self.bilinear(cx, cy),
            ResampleMethod::Mode => {
                let values = self.footprint_values(footprint);
                if values.is_empty() {
                    self.nearest(cx, cy)
                } else {
                    Some(mode(&values))
                }
            }
            ResampleMethod::Average => {
                let values = self.footprint_values(footprint);
                if values.is_empty() {
                    self.nearest(cx, cy)
                } else {
                    let sum: f64 = values.iter().map(|v| *v as f64).sum();
                    Some((sum / values.len() as f64) as f32)
                }
            }
        }
    }

    fn nearest(&self, cx: f64, cy: f64) -> Option<f32> {
        self.get(cx.floor() as i64, cy.floor() as i64)
    }

    fn bilinear(&self, cx: f64, cy: f64) -> Option<f32> {
        let fx = cx - 0.5;
        let fy = cy - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let mut sum = 0.0f64;
        let mut weight = 0.0f64;
        for (dx, dy, w) in [
            (0, 0, (1.0 - tx) * (1.0 - ty)),
            (1, 0, tx * (1.0 - ty)),
            (0, 1, (1.0 - tx) * ty),
            (1, 1, tx * ty),
        ] {
            if w <= 0.0 {
                continue;
            }
            if let Some(v) = self.get(x0 + dx, y0 + dy) {
                sum += v as f64 * w;
                weight += w;
            }
        }
        if weight > 0.0 {
            Some((sum / weight) as f32)
        } else {
            None
        }
    }

    /// Valid values of all source pixels whose centres fall inside the
    /// footprint.
    fn footprint_values(&self, fp: &Footprint) -> Vec<f32> {
        let c_start = (fp.col_min - 0.5).ceil() as i64;
        let c_end = (fp.col_max - 0.5).ceil() as i64;
        let r_start = (fp.row_min - 0.5).ceil() as i64;
        let r_end = (fp.row_max - 0.5).ceil() as i64;
        let mut values = Vec::new();
        for row in r_start..r_end {
            for col in c_start..c_end {
                if let Some(v) = self.get(col, row) {
                    values.push(v);
                }
            }
        }
        values
    }
}

/// Most frequent value; ties go to the smallest value so the result does
/// not depend on scan order.
fn mode(values: &[f32]) -> f32 {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for v in values {
        *counts.entry(v.to_bits()).or_default() += 1;
    }
    let mut best = values[0];
    let mut best_count = 0;
    for (bits, count) in counts {
        let v = f32::from_bits(bits);
        if count > best_count || (count == best_count && v < best) {
            best = v;
            best_count = count;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(data: &[f32], width: usize) -> SourceBlock<'_> {
        SourceBlock {
            data,
            col0: 0,
            row0: 0,
            width,
            height: data.len() / width,
            nodata: -1.0,
        }
    }

    fn point(cx: f64, cy: f64) -> Footprint {
        Footprint {
            col_min: cx,
            row_min: cy,
            col_max: cx,
            row_max: cy,
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("near".parse::<ResampleMethod>().unwrap(), ResampleMethod::Nearest);
        assert_eq!("Bilinear".parse::<ResampleMethod>().unwrap(), ResampleMethod::Bilinear);
        assert_eq!("majority".parse::<ResampleMethod>().unwrap(), ResampleMethod::Mode);
        assert_eq!("mean".parse::<ResampleMethod>().unwrap(), ResampleMethod::Average);
        assert!("cubic".parse::<ResampleMethod>().is_err());
        assert_eq!(ResampleMethod::Mode.to_string(), "mode");
    }

    #[test]
    fn test_nearest_and_nodata() {
        let data = [1.0, 2.0, -1.0, 4.0];
        let b = block(&data, 2);
        assert_eq!(b.sample(ResampleMethod::Nearest, &point(1.2, 0.7)), Some(2.0));
        assert_eq!(b.sample(ResampleMethod::Nearest, &point(0.5, 1.5)), None);
        assert_eq!(b.sample(ResampleMethod::Nearest, &point(-0.5, 0.5)), None);
    }

    #[test]
    fn test_bilinear_midpoint_and_nodata_renormalised() {
        let data = [0.0, 10.0, 20.0, 30.0];
        let b = block(&data, 2);
        // Exactly between all four centres
        assert_eq!(b.sample(ResampleMethod::Bilinear, &point(1.0, 1.0)), Some(15.0));
        // At a pixel centre the value is exact
        assert_eq!(b.sample(ResampleMethod::Bilinear, &point(1.5, 0.5)), Some(10.0));

        let holes = [0.0, 10.0, -1.0, -1.0];
        let b = block(&holes, 2);
        assert_eq!(b.sample(ResampleMethod::Bilinear, &point(1.0, 1.0)), Some(5.0));
    }

    #[test]
    fn test_mode_prefers_majority_then_smallest() {
        let data = [3.0, 3.0, 5.0, 5.0, 5.0, 3.0, 7.0, -1.0, -1.0];
        let b = block(&data, 3);
        let whole = Footprint {
            col_min: 0.0,
            row_min: 0.0,
            col_max: 3.0,
            row_max: 3.0,
        };
        // 3 x3, 5 x3, 7 x1: tie broken towards 3
        assert_eq!(b.sample(ResampleMethod::Mode, &whole), Some(3.0));
    }

    #[test]
    fn test_average_ignores_nodata_and_falls_back_to_nearest() {
        let data = [1.0, 3.0, -1.0, 8.0];
        let b = block(&data, 2);
        let whole = Footprint {
            col_min: 0.0,
            row_min: 0.0,
            col_max: 2.0,
            row_max: 2.0,
        };
        assert_eq!(b.sample(ResampleMethod::Average, &whole), Some(4.0));

        // Footprint smaller than a pixel contains no centre
        let tiny = Footprint {
            col_min: 1.1,
            row_min: 1.1,
            col_max: 1.2,
            row_max: 1.2,
        };
        assert_eq!(b.sample(ResampleMethod::Average, &tiny), Some(8.0));
    }
}
