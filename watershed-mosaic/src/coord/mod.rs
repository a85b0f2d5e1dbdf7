//! Coordinate reference systems and conversions
//!
//! Provides the coordinate-reference zone selection used by the partitioner
//! (local UTM zone of a centroid), point and bounding-box transforms between
//! geographic WGS84 and WGS84/UTM, and the geodesic pixel-area helper used
//! for area-weighted mosaicking.

mod types;
mod utm;

pub use types::{BoundingBox, CoordError, Crs, EPSG_WGS84, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};
pub use utm::{central_meridian, from_utm, to_utm, UTM_K0, WGS84_A, WGS84_F};

use std::f64::consts::PI;

/// Radius of the WGS84 authalic sphere (metres), which preserves surface area.
pub const AUTHALIC_RADIUS_M: f64 = 6_371_007.181;

/// Number of sample points per edge when reprojecting a bounding box.
pub const BBOX_EDGE_SAMPLES: usize = 21;

/// Returns the UTM zone CRS appropriate for a geographic point.
///
/// Zone is `floor((lon + 180) / 6) mod 60 + 1`; the hemisphere is north
/// only for strictly positive latitudes.
#[inline]
pub fn utm_zone_for(lon: f64, lat: f64) -> Crs {
    let zone = (((lon + 180.0) / 6.0).floor() as i64).rem_euclid(60) as u8 + 1;
    Crs::Utm {
        zone,
        north: lat > 0.0,
    }
}

/// Transforms a single point between two CRSs.
pub fn transform_point(x: f64, y: f64, from: Crs, to: Crs) -> Result<(f64, f64), CoordError> {
    if from == to {
        return Ok((x, y));
    }
    let (lon, lat) = match from {
        Crs::Geographic => (x, y),
        Crs::Utm { zone, north } => from_utm(x, y, zone, north)?,
    };
    match to {
        Crs::Geographic => Ok((lon, lat)),
        Crs::Utm { zone, north } => to_utm(lon, lat, zone, north),
    }
}

/// Reprojects a bounding box by densifying each edge before transforming.
///
/// Curved edges in the target CRS are covered because every edge is sampled
/// at [`BBOX_EDGE_SAMPLES`] points, not just the corners.
pub fn reproject_bbox(bbox: &BoundingBox, from: Crs, to: Crs) -> Result<BoundingBox, CoordError> {
    if from == to {
        return Ok(*bbox);
    }

    let mut out = BoundingBox::empty();
    let steps = (BBOX_EDGE_SAMPLES - 1) as f64;
    for i in 0..BBOX_EDGE_SAMPLES {
        let fx = bbox.min_x + bbox.width() * i as f64 / steps;
        let fy = bbox.min_y + bbox.height() * i as f64 / steps;
        for (x, y) in [
            (fx, bbox.min_y),
            (fx, bbox.max_y),
            (bbox.min_x, fy),
            (bbox.max_x, fy),
        ] {
            let (tx, ty) = transform_point(x, y, from, to)?;
            out.expand_to(tx, ty);
        }
    }
    Ok(out)
}

/// Area in square metres of a geographic cell spanning `dlon` degrees of
/// longitude between two latitudes, on the authalic sphere.
#[inline]
pub fn geographic_pixel_area_m2(lat_a: f64, lat_b: f64, dlon: f64) -> f64 {
    let phi_a = lat_a.clamp(MIN_LAT, MAX_LAT) * PI / 180.0;
    let phi_b = lat_b.clamp(MIN_LAT, MAX_LAT) * PI / 180.0;
    AUTHALIC_RADIUS_M * AUTHALIC_RADIUS_M * (dlon.abs() * PI / 180.0) * (phi_a.sin() - phi_b.sin()).abs()
}

#[cfg(test)]
mod tests;
