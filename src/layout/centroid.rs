//! Label placement for region outlines.
//!
//! Rings are treated as planar polygons with lon as x and lat as y, which
//! is accurate enough for placing a label inside a state or province.

use crate::location::Coordinate;

/// Signed shoelace area in square degrees. Counter-clockwise is positive.
///
/// The closing vertex may be repeated or omitted.
pub fn polygon_area(ring: &[Coordinate]) -> f64 {
    edges(ring).map(|(a, b)| a.lon * b.lat - b.lon * a.lat).sum::<f64>() / 2.0
}

/// Area-weighted centroid of a ring.
///
/// Rings with no area (fewer than three distinct vertices, collinear
/// points) fall back to the mean of their vertices.
pub fn polygon_centroid(ring: &[Coordinate]) -> Option<Coordinate> {
    let ring = open_ring(ring);
    if ring.is_empty() {
        return None;
    }

    let area = polygon_area(ring);
    if area.abs() < f64::EPSILON {
        return Some(vertex_mean(ring));
    }

    let (mut cx, mut cy) = (0.0, 0.0);
    for (a, b) in edges(ring) {
        let cross = a.lon * b.lat - b.lon * a.lat;
        cx += (a.lon + b.lon) * cross;
        cy += (a.lat + b.lat) * cross;
    }
    let k = 1.0 / (6.0 * area);
    Some(Coordinate::new(cy * k, cx * k))
}

/// Label anchor for a multi-part region: the centroid of its largest ring.
pub fn label_point(polygons: &[Vec<Coordinate>]) -> Option<Coordinate> {
    polygons
        .iter()
        .filter(|ring| !ring.is_empty())
        .max_by(|a, b| {
            polygon_area(a)
                .abs()
                .partial_cmp(&polygon_area(b).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .and_then(|ring| polygon_centroid(ring))
}

fn open_ring(ring: &[Coordinate]) -> &[Coordinate] {
    match ring {
        [first, .., last] if first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

fn edges(ring: &[Coordinate]) -> impl Iterator<Item = (Coordinate, Coordinate)> + '_ {
    let ring = open_ring(ring);
    let n = ring.len();
    (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
}

fn vertex_mean(ring: &[Coordinate]) -> Coordinate {
    let n = ring.len() as f64;
    let lat = ring.iter().map(|c| c.lat).sum::<f64>() / n;
    let lon = ring.iter().map(|c| c.lon).sum::<f64>() / n;
    Coordinate::new(lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn c(lon: f64, lat: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    fn unit_square() -> Vec<Coordinate> {
        vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0)]
    }

    #[test]
    fn test_square_area_and_orientation() {
        assert_abs_diff_eq!(polygon_area(&unit_square()), 1.0);
        let mut cw = unit_square();
        cw.reverse();
        assert_abs_diff_eq!(polygon_area(&cw), -1.0);
    }

    #[test]
    fn test_square_centroid() {
        let centroid = polygon_centroid(&unit_square()).unwrap();
        assert_abs_diff_eq!(centroid.lat, 0.5);
        assert_abs_diff_eq!(centroid.lon, 0.5);
    }

    #[test]
    fn test_closed_ring_same_as_open() {
        let mut closed = unit_square();
        closed.push(closed[0]);
        assert_eq!(polygon_centroid(&closed), polygon_centroid(&unit_square()));
        assert_abs_diff_eq!(polygon_area(&closed), 1.0);
    }

    #[test]
    fn test_l_shape_is_area_weighted() {
        // 2x2 square missing its top-right 1x1 quadrant.
        let ring = vec![
            c(0.0, 0.0),
            c(2.0, 0.0),
            c(2.0, 1.0),
            c(1.0, 1.0),
            c(1.0, 2.0),
            c(0.0, 2.0),
        ];
        let centroid = polygon_centroid(&ring).unwrap();
        assert_abs_diff_eq!(centroid.lon, 5.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(centroid.lat, 5.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_rings() {
        assert!(polygon_centroid(&[]).is_none());

        let single = polygon_centroid(&[c(3.0, 4.0)]).unwrap();
        assert_eq!(single, c(3.0, 4.0));

        let line = polygon_centroid(&[c(0.0, 0.0), c(2.0, 2.0), c(4.0, 4.0)]).unwrap();
        assert_abs_diff_eq!(line.lon, 2.0);
        assert_abs_diff_eq!(line.lat, 2.0);
    }

    #[test]
    fn test_label_point_picks_largest_part() {
        let island = vec![c(10.0, 10.0), c(10.5, 10.0), c(10.5, 10.5), c(10.0, 10.5)];
        let mainland = vec![c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 4.0)];
        let label = label_point(&[island, mainland]).unwrap();
        assert_abs_diff_eq!(label.lon, 2.0);
        assert_abs_diff_eq!(label.lat, 2.0);

        assert!(label_point(&[]).is_none());
    }
}
