//! Point-to-corridor distance gate (spec.md §4.4, §6).
//!
//! The spec treats `findByTypeAndCorridor`/`findByRegionsAndCorridor` as
//! external store operations that already apply the "distance ≤
//! bufferMeters" predicate. This module implements that predicate locally
//! so an in-memory [`crate::traits::PlaceStore`] test double (or a future
//! non-spatial-database deployment) can apply it itself.
//!
//! Distances use an equirectangular projection centered on the query point,
//! which is accurate to a few meters at the corridor buffer scale (tens of
//! kilometers) used here — adequate for a gate, not for display-grade
//! measurement.

use geo::{Coord, LineString, MultiLineString, Polygon};

use crate::model::{Corridor, CorridorGeometry, GeoPoint};

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

fn local_xy(origin: GeoPoint, p: Coord<f64>) -> (f64, f64) {
    let lat0_rad = origin.lat.to_radians();
    let x = (p.x - origin.lng) * METERS_PER_DEGREE_LAT * lat0_rad.cos();
    let y = (p.y - origin.lat) * METERS_PER_DEGREE_LAT;
    (x, y)
}

fn distance_point_to_segment_m(p: GeoPoint, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let (px, py) = (0.0, 0.0);
    let (ax, ay) = local_xy(p, a);
    let (bx, by) = local_xy(p, b);

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq <= f64::EPSILON {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };

    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

fn distance_to_linestring_m(p: GeoPoint, line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|segment| distance_point_to_segment_m(p, segment.start, segment.end))
        .fold(f64::INFINITY, f64::min)
}

fn distance_to_multilinestring_m(p: GeoPoint, lines: &MultiLineString<f64>) -> f64 {
    lines
        .iter()
        .map(|line| distance_to_linestring_m(p, line))
        .fold(f64::INFINITY, f64::min)
}

fn point_in_ring(p: GeoPoint, ring: &LineString<f64>) -> bool {
    // Ray casting in the local planar frame; adequate for a gate check.
    let mut inside = false;
    let coords: Vec<Coord<f64>> = ring.coords().copied().collect();
    let n = coords.len();
    if n < 3 {
        return false;
    }
    let (px, py) = local_xy(p, Coord { x: p.lng, y: p.lat });
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = local_xy(p, coords[i]);
        let (xj, yj) = local_xy(p, coords[j]);
        let intersects = ((yi > py) != (yj > py))
            && (px < (xj - xi) * (py - yi) / (yj - yi) + xi);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn distance_to_polygon_m(p: GeoPoint, polygon: &Polygon<f64>) -> f64 {
    if point_in_ring(p, polygon.exterior()) {
        return 0.0;
    }
    distance_to_linestring_m(p, polygon.exterior())
}

/// Great-circle-ish distance in meters from `point` to `geometry`.
pub fn distance_to_geometry_m(point: GeoPoint, geometry: &CorridorGeometry) -> f64 {
    match geometry {
        CorridorGeometry::LineString(line) => distance_to_linestring_m(point, line),
        CorridorGeometry::MultiLineString(lines) => distance_to_multilinestring_m(point, lines),
        CorridorGeometry::Polygon(polygon) => distance_to_polygon_m(point, polygon),
    }
}

/// `distance ≤ bufferMeters` gate used by the POI generator (spec.md §4.4
/// glossary: "Corridor").
///
/// Absence of a corridor is treated as "no spatial filter" — the caller
/// decides whether that means "pass" (optional region filters) per spec.md
/// §4.4 step 3.
pub fn within_corridor(point: GeoPoint, corridor: &Corridor) -> bool {
    distance_to_geometry_m(point, &corridor.geometry) <= corridor.buffer_meters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_corridor(points: Vec<(f64, f64)>, buffer_m: f64) -> Corridor {
        let coords: Vec<Coord<f64>> = points.into_iter().map(|(lat, lng)| Coord { x: lng, y: lat }).collect();
        Corridor {
            geometry: CorridorGeometry::LineString(LineString::new(coords)),
            buffer_meters: buffer_m,
        }
    }

    #[test]
    fn point_on_the_line_is_within_any_buffer() {
        let corridor = line_corridor(vec![(10.0, 100.0), (10.5, 100.5)], 1000.0);
        assert!(within_corridor(GeoPoint::new(10.25, 100.25), &corridor));
    }

    #[test]
    fn far_point_is_excluded() {
        let corridor = line_corridor(vec![(10.0, 100.0), (10.5, 100.5)], 1000.0);
        assert!(!within_corridor(GeoPoint::new(20.0, 120.0), &corridor));
    }

    #[test]
    fn point_inside_polygon_has_zero_distance() {
        let ring = LineString::new(vec![
            Coord { x: 100.0, y: 10.0 },
            Coord { x: 101.0, y: 10.0 },
            Coord { x: 101.0, y: 11.0 },
            Coord { x: 100.0, y: 11.0 },
            Coord { x: 100.0, y: 10.0 },
        ]);
        let polygon = Polygon::new(ring, vec![]);
        let corridor = Corridor {
            geometry: CorridorGeometry::Polygon(polygon),
            buffer_meters: 1.0,
        };
        assert!(within_corridor(GeoPoint::new(10.5, 100.5), &corridor));
    }
}
