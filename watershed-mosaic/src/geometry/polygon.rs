//! Polygon types with shoelace area and centroid.

use crate::coord::BoundingBox;

/// A closed ring of `[x, y]` positions. The last position may repeat the
/// first; measures treat the ring as closed either way.
pub type Ring = Vec<[f64; 2]>;

/// A polygon with one exterior ring and zero or more holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

/// A set of polygons treated as one geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPolygon(pub Vec<Polygon>);

/// Signed ring area and the (unnormalised) first moments.
///
/// Returns `(signed_area, cx_sum, cy_sum)` where the centroid of the ring
/// is `(cx_sum / (6 * area), cy_sum / (6 * area))`.
fn ring_moments(ring: &[[f64; 2]]) -> (f64, f64, f64) {
    if ring.len() < 3 {
        return (0.0, 0.0, 0.0);
    }
    // Shift to the first vertex to keep the products well conditioned for
    // projected coordinates in the millions of metres.
    let [ox, oy] = ring[0];
    let mut twice_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..ring.len() {
        let [x0, y0] = ring[i];
        let [x1, y1] = ring[(i + 1) % ring.len()];
        let (x0, y0, x1, y1) = (x0 - ox, y0 - oy, x1 - ox, y1 - oy);
        let cross = x0 * y1 - x1 * y0;
        twice_area += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }
    let area = twice_area / 2.0;
    // Undo the shift: first moments gain origin * 6 * area
    (area, cx + ox * 6.0 * area, cy + oy * 6.0 * area)
}

impl Polygon {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    /// Exterior area minus hole areas, independent of ring orientation.
    pub fn area(&self) -> f64 {
        let outer = ring_moments(&self.exterior).0.abs();
        let holes: f64 = self.holes.iter().map(|h| ring_moments(h).0.abs()).sum();
        (outer - holes).max(0.0)
    }

    /// Returns `(area, moment_x, moment_y)` with holes subtracted.
    fn moments(&self) -> (f64, f64, f64) {
        let (a, mx, my) = ring_moments(&self.exterior);
        let sign = a.signum();
        let mut area = a.abs();
        let mut sx = mx * sign;
        let mut sy = my * sign;
        for hole in &self.holes {
            let (ha, hx, hy) = ring_moments(hole);
            let hs = ha.signum();
            area -= ha.abs();
            sx -= hx * hs;
            sy -= hy * hs;
        }
        (area, sx, sy)
    }

    pub fn bbox(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for [x, y] in &self.exterior {
            bbox.expand_to(*x, *y);
        }
        bbox
    }

    pub fn is_degenerate(&self) -> bool {
        self.exterior.len() < 3
    }
}

impl MultiPolygon {
    pub fn area(&self) -> f64 {
        self.0.iter().map(Polygon::area).sum()
    }

    /// Area-weighted centroid across all parts.
    pub fn centroid(&self) -> (f64, f64) {
        let mut area = 0.0;
        let mut sx = 0.0;
        let mut sy = 0.0;
        for poly in &self.0 {
            let (a, mx, my) = poly.moments();
            area += a;
            sx += mx;
            sy += my;
        }
        if area.abs() < f64::EPSILON {
            let bbox = self.bbox();
            return (
                (bbox.min_x + bbox.max_x) / 2.0,
                (bbox.min_y + bbox.max_y) / 2.0,
            );
        }
        (sx / (6.0 * area), sy / (6.0 * area))
    }

    pub fn bbox(&self) -> BoundingBox {
        self.0
            .iter()
            .fold(BoundingBox::empty(), |acc, p| acc.union(&p.bbox()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0.iter().all(Polygon::is_degenerate)
    }

    /// Applies a fallible transform to every vertex.
    pub fn try_map<E, F>(&self, mut f: F) -> Result<MultiPolygon, E>
    where
        F: FnMut(f64, f64) -> Result<(f64, f64), E>,
    {
        let mut map_ring = |ring: &Ring| -> Result<Ring, E> {
            ring.iter()
                .map(|[x, y]| f(*x, *y).map(|(tx, ty)| [tx, ty]))
                .collect()
        };
        let mut polygons = Vec::with_capacity(self.0.len());
        for poly in &self.0 {
            let exterior = map_ring(&poly.exterior)?;
            let holes = poly
                .holes
                .iter()
                .map(&mut map_ring)
                .collect::<Result<Vec<_>, E>>()?;
            polygons.push(Polygon { exterior, holes });
        }
        Ok(MultiPolygon(polygons))
    }
}
