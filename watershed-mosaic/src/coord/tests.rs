//! Tests for coordinate conversion

use super::*;

#[test]
fn test_central_meridian_maps_to_false_easting() {
    // Zone 18 central meridian is 75°W; 45°N meridian arc is ~4984944 m
    let (e, n) = to_utm(-75.0, 45.0, 18, true).unwrap();
    assert!((e - 500_000.0).abs() < 1e-6);
    assert!((n - 4_982_950.400).abs() < 0.01, "northing was {}", n);
}

#[test]
fn test_new_york_city_utm() {
    // New York City: 40.7128°N, 74.0060°W lies in 18N
    let (e, n) = to_utm(-74.0060, 40.7128, 18, true).unwrap();
    assert!((e - 583_959.37).abs() < 0.05, "easting was {}", e);
    assert!((n - 4_507_350.99).abs() < 0.05, "northing was {}", n);
}

#[test]
fn test_southern_hemisphere_false_northing() {
    // Sydney: 33.8688°S, 151.2093°E lies in 56S
    let (e, n) = to_utm(151.2093, -33.8688, 56, false).unwrap();
    assert!((e - 334_368.63).abs() < 0.05, "easting was {}", e);
    assert!((n - 6_250_948.35).abs() < 0.05, "northing was {}", n);
}

#[test]
fn test_equator_south_origin() {
    let (e, n) = to_utm(3.0, 0.0, 31, false).unwrap();
    assert!((e - 500_000.0).abs() < 1e-6);
    assert!((n - 10_000_000.0).abs() < 1e-6);
}

#[test]
fn test_utm_roundtrip() {
    for &(lon, lat) in &[(-74.006, 40.7128), (151.2093, -33.8688), (10.5, 62.0), (-0.1, 0.5)] {
        let crs = utm_zone_for(lon, lat);
        let (x, y) = transform_point(lon, lat, Crs::Geographic, crs).unwrap();
        let (lon2, lat2) = transform_point(x, y, crs, Crs::Geographic).unwrap();
        assert!((lon - lon2).abs() < 1e-6, "lon {} -> {}", lon, lon2);
        assert!((lat - lat2).abs() < 1e-6, "lat {} -> {}", lat, lat2);
    }
}

#[test]
fn test_invalid_zone() {
    assert_eq!(to_utm(0.0, 0.0, 0, true), Err(CoordError::InvalidZone(0)));
    assert_eq!(from_utm(0.0, 0.0, 61, true), Err(CoordError::InvalidZone(61)));
}

#[test]
fn test_invalid_latitude() {
    assert!(matches!(
        to_utm(0.0, 91.0, 31, true),
        Err(CoordError::InvalidLatitude(_))
    ));
}

#[test]
fn test_utm_zone_for() {
    assert_eq!(utm_zone_for(-74.0, 40.7), Crs::Utm { zone: 18, north: true });
    assert_eq!(utm_zone_for(151.2, -33.8), Crs::Utm { zone: 56, north: false });
    assert_eq!(utm_zone_for(-180.0, 10.0), Crs::Utm { zone: 1, north: true });
    // 180°E wraps back to zone 1
    assert_eq!(utm_zone_for(180.0, 10.0), Crs::Utm { zone: 1, north: true });
    // Exactly on the equator counts as south
    assert_eq!(utm_zone_for(3.0, 0.0), Crs::Utm { zone: 31, north: false });
}

#[test]
fn test_epsg_codes() {
    assert_eq!(Crs::Geographic.epsg(), 4326);
    assert_eq!(Crs::Utm { zone: 33, north: true }.epsg(), 32633);
    assert_eq!(Crs::Utm { zone: 7, north: false }.epsg(), 32707);
    assert_eq!(Crs::from_epsg(32760).unwrap(), Crs::Utm { zone: 60, north: false });
    assert_eq!(Crs::from_epsg(3857), Err(CoordError::UnsupportedEpsg(3857)));
}

#[test]
fn test_crs_parse_forms() {
    assert_eq!("EPSG:32633".parse::<Crs>().unwrap(), Crs::Utm { zone: 33, north: true });
    assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::Geographic);
    assert_eq!(
        "urn:ogc:def:crs:EPSG::32701".parse::<Crs>().unwrap(),
        Crs::Utm { zone: 1, north: false }
    );
    assert_eq!("4326".parse::<Crs>().unwrap(), Crs::Geographic);
    assert!("EPSG:abc".parse::<Crs>().is_err());
    assert_eq!(Crs::Utm { zone: 18, north: true }.to_string(), "EPSG:32618");
}

#[test]
fn test_reproject_bbox_contains_projected_corners() {
    let bbox = BoundingBox::new(-75.0, 40.0, -73.0, 42.0);
    let crs = Crs::Utm { zone: 18, north: true };
    let projected = reproject_bbox(&bbox, Crs::Geographic, crs).unwrap();

    for (lon, lat) in [(-75.0, 40.0), (-73.0, 42.0), (-74.0, 42.0), (-75.0, 41.0)] {
        let (x, y) = to_utm(lon, lat, 18, true).unwrap();
        assert!(projected.contains(x, y), "({}, {}) not in {}", lon, lat, projected);
    }

    let back = reproject_bbox(&projected, crs, Crs::Geographic).unwrap();
    assert!(back.min_x <= -75.0 + 1e-6 && back.max_x >= -73.0 - 1e-6);
    assert!(back.min_y <= 40.0 + 1e-6 && back.max_y >= 42.0 - 1e-6);
}

#[test]
fn test_reproject_bbox_identity() {
    let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
    assert_eq!(reproject_bbox(&bbox, Crs::Geographic, Crs::Geographic).unwrap(), bbox);
}

#[test]
fn test_bbox_parse_and_intersection() {
    let a = BoundingBox::parse("-180, -90, 180, 90").unwrap();
    assert_eq!(a, BoundingBox::world());
    assert!(BoundingBox::parse("1,2,3").is_err());
    assert!(BoundingBox::parse("3,2,1,4").is_err());

    let b = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
    let c = BoundingBox::new(1.0, 1.0, 3.0, 3.0);
    assert_eq!(b.intersection(&c), Some(BoundingBox::new(1.0, 1.0, 2.0, 2.0)));
    assert_eq!(b.intersection(&BoundingBox::new(5.0, 5.0, 6.0, 6.0)), None);
    assert_eq!(b.union(&c), BoundingBox::new(0.0, 0.0, 3.0, 3.0));
}

#[test]
fn test_empty_bbox() {
    let mut bbox = BoundingBox::empty();
    assert!(bbox.is_empty());
    assert_eq!(bbox.area(), 0.0);
    bbox.expand_to(1.0, 2.0);
    bbox.expand_to(3.0, -1.0);
    assert_eq!(bbox, BoundingBox::new(1.0, -1.0, 3.0, 2.0));
}

#[test]
fn test_pixel_area_shrinks_toward_poles() {
    let equator = geographic_pixel_area_m2(1.0, 0.0, 1.0);
    let high = geographic_pixel_area_m2(61.0, 60.0, 1.0);
    // One square degree at the equator is ~12,364 km²
    assert!((equator / 1e6 - 12_363.7).abs() < 1.0, "area was {}", equator);
    assert!(high < equator * 0.51 && high > equator * 0.48);
    // Argument order does not matter
    assert_eq!(geographic_pixel_area_m2(0.0, 1.0, -1.0), equator);
}
