//! Transverse Mercator on the WGS84 ellipsoid, UTM parameterisation.
//!
//! Series expansions follow Snyder, "Map Projections: A Working Manual"
//! (USGS PP 1395), which are accurate to well under a metre within a zone
//! and degrade gracefully a few zones away from the central meridian.

use std::f64::consts::PI;

use super::types::CoordError;

/// WGS84 semi-major axis (metres).
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// UTM scale factor on the central meridian.
pub const UTM_K0: f64 = 0.9996;

/// UTM false easting (metres).
pub const UTM_FALSE_EASTING: f64 = 500_000.0;

/// UTM false northing for the southern hemisphere (metres).
pub const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

const E2: f64 = WGS84_F * (2.0 - WGS84_F);
const EP2: f64 = E2 / (1.0 - E2);

/// Central meridian of a UTM zone, in degrees.
#[inline]
pub fn central_meridian(zone: u8) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

/// Meridian arc length from the equator to latitude `phi` (radians).
fn meridian_arc(phi: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;
    WGS84_A
        * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Projects a geographic point into UTM easting/northing.
pub fn to_utm(lon: f64, lat: f64, zone: u8, north: bool) -> Result<(f64, f64), CoordError> {
    if !(1..=60).contains(&zone) {
        return Err(CoordError::InvalidZone(zone));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }

    let phi = lat * PI / 180.0;
    let mut dlon = lon - central_meridian(zone);
    // Keep the longitude difference in [-180, 180) across the antimeridian
    if dlon >= 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }
    let lam = dlon * PI / 180.0;

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let n = WGS84_A / (1.0 - E2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = EP2 * cos_phi * cos_phi;
    let a = cos_phi * lam;
    let m = meridian_arc(phi);

    let easting = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * EP2) * a.powi(5) / 120.0)
        + UTM_FALSE_EASTING;

    let mut northing = UTM_K0
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * EP2) * a.powi(6) / 720.0));

    if !north {
        northing += UTM_FALSE_NORTHING_SOUTH;
    }

    Ok((easting, northing))
}

/// Converts UTM easting/northing back to geographic longitude/latitude.
pub fn from_utm(easting: f64, northing: f64, zone: u8, north: bool) -> Result<(f64, f64), CoordError> {
    if !(1..=60).contains(&zone) {
        return Err(CoordError::InvalidZone(zone));
    }

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let y = if north {
        northing
    } else {
        northing - UTM_FALSE_NORTHING_SOUTH
    };
    let x = easting - UTM_FALSE_EASTING;

    let m = y / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1me2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = EP2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let n1 = WGS84_A / (1.0 - E2 * sin_phi1 * sin_phi1).sqrt();
    let r1 = WGS84_A * (1.0 - E2) / (1.0 - E2 * sin_phi1 * sin_phi1).powf(1.5);
    let d = x / (n1 * UTM_K0);

    let phi = phi1
        - (n1 * tan_phi1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * EP2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * EP2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lam = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * EP2 + 24.0 * t1 * t1) * d.powi(5)
            / 120.0)
        / cos_phi1;

    let mut lon = central_meridian(zone) + lam * 180.0 / PI;
    if lon > 180.0 {
        lon -= 360.0;
    } else if lon < -180.0 {
        lon += 360.0;
    }

    Ok((lon, phi * 180.0 / PI))
}
