//! Coordinate type definitions

use std::fmt;
use std::str::FromStr;

/// Valid latitude range
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// EPSG code of geographic WGS84.
pub const EPSG_WGS84: u32 = 4326;

/// Coordinate reference systems understood by the pipeline.
///
/// Input collections and global mosaics are geographic WGS84. Job subsets
/// are reprojected into the UTM zone of their centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Crs {
    /// Geographic WGS84 (EPSG:4326), degrees.
    Geographic,
    /// WGS84 / UTM, metres. EPSG 326zz (north) or 327zz (south).
    Utm {
        /// Zone number, 1-60
        zone: u8,
        /// Northern hemisphere
        north: bool,
    },
}

impl Crs {
    /// Returns the EPSG code for this CRS.
    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Geographic => EPSG_WGS84,
            Crs::Utm { zone, north: true } => 32600 + *zone as u32,
            Crs::Utm { zone, north: false } => 32700 + *zone as u32,
        }
    }

    /// Builds a CRS from an EPSG code.
    pub fn from_epsg(code: u32) -> Result<Self, CoordError> {
        match code {
            EPSG_WGS84 => Ok(Crs::Geographic),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            _ => Err(CoordError::UnsupportedEpsg(code)),
        }
    }

    /// Returns true for geographic (degree based) systems.
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Geographic)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = CoordError;

    /// Accepts `EPSG:32633`, `epsg:4326`, the OGC URN form, or a bare code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let code = trimmed
            .rsplit(':')
            .next()
            .unwrap_or(trimmed)
            .trim()
            .parse::<u32>()
            .map_err(|_| CoordError::InvalidCrs(trimmed.to_string()))?;
        Crs::from_epsg(code)
    }
}

/// Axis-aligned bounding box in the units of its CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// An "empty" box that any union will replace.
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// The whole geographic world.
    pub fn world() -> Self {
        Self::new(MIN_LON, MIN_LAT, MAX_LON, MAX_LAT)
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    /// Grows this box to include a point.
    pub fn expand_to(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Returns the overlap of two boxes, or `None` when they are disjoint.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let bbox = BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if bbox.min_x < bbox.max_x && bbox.min_y < bbox.max_y {
            Some(bbox)
        } else {
            None
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Parses `min_x,min_y,max_x,max_y`.
    pub fn parse(s: &str) -> Result<Self, CoordError> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| CoordError::InvalidBounds(s.to_string()))?;
        if parts.len() != 4 || parts[0] >= parts[2] || parts[1] >= parts[3] {
            return Err(CoordError::InvalidBounds(s.to_string()));
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Latitude outside the valid range
    InvalidLatitude(f64),
    /// Longitude outside the valid range
    InvalidLongitude(f64),
    /// UTM zone outside 1-60
    InvalidZone(u8),
    /// EPSG code that is neither WGS84 nor WGS84/UTM
    UnsupportedEpsg(u32),
    /// Unparseable CRS string
    InvalidCrs(String),
    /// Unparseable or inverted bounds string
    InvalidBounds(String),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::InvalidLatitude(lat) => {
                write!(f, "Invalid latitude: {} (must be between {} and {})", lat, MIN_LAT, MAX_LAT)
            }
            CoordError::InvalidLongitude(lon) => {
                write!(f, "Invalid longitude: {} (must be between {} and {})", lon, MIN_LON, MAX_LON)
            }
            CoordError::InvalidZone(zone) => write!(f, "Invalid UTM zone: {} (must be 1-60)", zone),
            CoordError::UnsupportedEpsg(code) => write!(f, "Unsupported EPSG code: {}", code),
            CoordError::InvalidCrs(s) => write!(f, "Invalid CRS: '{}'", s),
            CoordError::InvalidBounds(s) => {
                write!(f, "Invalid bounds '{}': expected min_x,min_y,max_x,max_y", s)
            }
        }
    }
}

impl std::error::Error for CoordError {}
