//! Separating markers that sit on exactly the same coordinate.
//!
//! Points are grouped by exact (lat, lon) equality in first-seen order.
//! Groups of one are left alone; larger groups are spread either on a
//! small circle around the shared position or by bounded random jitter.

use crate::location::Coordinate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::TAU;
use tracing::warn;

pub const DEFAULT_RADIUS: f64 = 0.02;
pub const DEFAULT_EPSILON: f64 = 0.0001;
/// Largest radius or epsilon accepted, in degrees.
pub const MAX_OFFSET: f64 = 90.0;

/// A named map marker with free-form hover metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Point {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Anything with a movable position.
pub trait Located {
    fn coordinate(&self) -> Coordinate;
    fn set_coordinate(&mut self, coord: Coordinate);
}

impl Located for Point {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    fn set_coordinate(&mut self, coord: Coordinate) {
        self.lat = coord.lat;
        self.lon = coord.lon;
    }
}

impl Located for Coordinate {
    fn coordinate(&self) -> Coordinate {
        *self
    }

    fn set_coordinate(&mut self, coord: Coordinate) {
        *self = coord;
    }
}

/// How coincident points are pulled apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DedupStrategy {
    /// Member `i` of `k` goes to angle `2πi/k` on a circle of `radius` degrees.
    Angular { radius: f64 },
    /// Independent uniform offsets in `[-epsilon, epsilon]` on each axis.
    Jitter { epsilon: f64 },
}

impl DedupStrategy {
    pub fn angular() -> Self {
        Self::Angular { radius: DEFAULT_RADIUS }
    }

    pub fn jitter() -> Self {
        Self::Jitter { epsilon: DEFAULT_EPSILON }
    }

    /// Radius or epsilon must be finite and at most [`MAX_OFFSET`] in magnitude.
    pub fn is_valid(&self) -> bool {
        let offset = match *self {
            Self::Angular { radius } => radius,
            Self::Jitter { epsilon } => epsilon,
        };
        offset.is_finite() && offset.abs() <= MAX_OFFSET
    }
}

impl Default for DedupStrategy {
    fn default() -> Self {
        Self::angular()
    }
}

/// Spread coincident points apart, using the thread RNG for jitter.
pub fn deduplicate_coordinates<T>(points: &[T], strategy: DedupStrategy) -> Vec<T>
where
    T: Located + Clone,
{
    deduplicate_with_rng(points, strategy, &mut rand::thread_rng())
}

/// Same as [`deduplicate_coordinates`] with a caller-supplied RNG.
///
/// The RNG is only consulted in jitter mode. An invalid strategy (see
/// [`DedupStrategy::is_valid`]) leaves every point where it is.
pub fn deduplicate_with_rng<T, R>(points: &[T], strategy: DedupStrategy, rng: &mut R) -> Vec<T>
where
    T: Located + Clone,
    R: Rng + ?Sized,
{
    let mut out = points.to_vec();
    if !strategy.is_valid() {
        warn!(?strategy, "unusable dedup offset, points left in place");
        return out;
    }

    for group in coincident_groups(points) {
        let k = group.len();
        let center = points[group[0]].coordinate();

        for (i, &idx) in group.iter().enumerate() {
            let moved = match strategy {
                DedupStrategy::Angular { radius } => {
                    let theta = TAU * i as f64 / k as f64;
                    Coordinate::new(center.lat + radius * theta.sin(), center.lon + radius * theta.cos())
                }
                DedupStrategy::Jitter { epsilon } => {
                    let eps = epsilon.abs();
                    Coordinate::new(
                        center.lat + rng.gen_range(-eps..=eps),
                        center.lon + rng.gen_range(-eps..=eps),
                    )
                }
            };
            out[idx].set_coordinate(moved);
        }
    }

    out
}

/// Indices of points sharing a coordinate, for groups larger than one.
///
/// Groups appear in order of their first member; members keep input order.
fn coincident_groups<T: Located>(points: &[T]) -> Vec<Vec<usize>> {
    let mut slot: HashMap<(u64, u64), usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (idx, p) in points.iter().enumerate() {
        let Some(key) = coordinate_key(p.coordinate()) else {
            continue;
        };
        match slot.get(&key) {
            Some(&g) => groups[g].push(idx),
            None => {
                slot.insert(key, groups.len());
                groups.push(vec![idx]);
            }
        }
    }

    groups.retain(|g| g.len() > 1);
    groups
}

/// Bit pattern used for exact equality. `-0.0` folds into `0.0`; NaN never groups.
fn coordinate_key(c: Coordinate) -> Option<(u64, u64)> {
    if c.lat.is_nan() || c.lon.is_nan() {
        return None;
    }
    let bits = |v: f64| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
    Some((bits(c.lat), bits(c.lon)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample() -> Vec<Point> {
        vec![
            Point::new("A", 10.0, 20.0).with_meta("king", "Saul"),
            Point::new("B", 10.0, 20.0).with_meta("king", "David"),
            Point::new("C", 30.0, 40.0).with_meta("king", "Solomon"),
        ]
    }

    #[test]
    fn test_angular_example() {
        let out = deduplicate_coordinates(&sample(), DedupStrategy::Angular { radius: 0.02 });

        // angle 0
        assert_abs_diff_eq!(out[0].lat, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[0].lon, 20.02, epsilon = 1e-12);
        // angle π
        assert_abs_diff_eq!(out[1].lat, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1].lon, 19.98, epsilon = 1e-12);

        assert_eq!(out[2], sample()[2]);
    }

    #[test]
    fn test_angular_members_on_circle() {
        let points: Vec<Point> = (0..5).map(|i| Point::new(format!("p{i}"), -1.5, 7.25)).collect();
        let out = deduplicate_coordinates(&points, DedupStrategy::Angular { radius: 0.02 });

        for p in &out {
            let d = ((p.lat + 1.5).powi(2) + (p.lon - 7.25).powi(2)).sqrt();
            assert_abs_diff_eq!(d, 0.02, epsilon = 1e-12);
        }
        let mean_lat = out.iter().map(|p| p.lat).sum::<f64>() / 5.0;
        let mean_lon = out.iter().map(|p| p.lon).sum::<f64>() / 5.0;
        assert_abs_diff_eq!(mean_lat, -1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(mean_lon, 7.25, epsilon = 1e-12);
    }

    #[test]
    fn test_angular_is_bit_identical_across_runs() {
        let mut points = sample();
        points.push(Point::new("D", 10.0, 20.0));
        points.push(Point::new("E", 30.0, 40.0));

        let a = deduplicate_coordinates(&points, DedupStrategy::angular());
        let b = deduplicate_coordinates(&points, DedupStrategy::angular());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.lat.to_bits(), y.lat.to_bits());
            assert_eq!(x.lon.to_bits(), y.lon.to_bits());
        }
    }

    #[test]
    fn test_preserves_length_order_and_metadata() {
        for strategy in [DedupStrategy::angular(), DedupStrategy::jitter()] {
            let input = sample();
            let out = deduplicate_coordinates(&input, strategy);
            assert_eq!(out.len(), input.len());
            for (before, after) in input.iter().zip(&out) {
                assert_eq!(before.name, after.name);
                assert_eq!(before.metadata, after.metadata);
            }
        }
    }

    #[test]
    fn test_singletons_untouched() {
        let input = vec![Point::new("X", 1.0, 2.0), Point::new("Y", 1.0, 2.000001)];
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(deduplicate_with_rng(&input, DedupStrategy::jitter(), &mut rng), input);
        assert_eq!(deduplicate_coordinates(&input, DedupStrategy::angular()), input);
    }

    #[test]
    fn test_jitter_bounded_and_distinct_over_seeds() {
        let input: Vec<Point> = (0..4).map(|i| Point::new(format!("m{i}"), 31.77, 35.21)).collect();
        let eps = 0.0001;
        let mut collisions = 0;

        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = deduplicate_with_rng(&input, DedupStrategy::Jitter { epsilon: eps }, &mut rng);

            for p in &out {
                assert!((p.lat - 31.77).abs() <= eps + 1e-12);
                assert!((p.lon - 35.21).abs() <= eps + 1e-12);
            }
            for i in 0..out.len() {
                for j in (i + 1)..out.len() {
                    if out[i].lat == out[j].lat && out[i].lon == out[j].lon {
                        collisions += 1;
                    }
                }
            }
        }
        assert!(collisions <= 1, "{collisions} coincident pairs after jitter");
    }

    #[test]
    fn test_unusable_offsets_leave_points_in_place() {
        let input = vec![Point::new("a", 1.0, 1.0), Point::new("b", 1.0, 1.0)];
        let mut rng = StdRng::seed_from_u64(3);

        for strategy in [
            DedupStrategy::Jitter { epsilon: f64::NAN },
            DedupStrategy::Jitter { epsilon: f64::INFINITY },
            DedupStrategy::Jitter { epsilon: f64::MAX },
            DedupStrategy::Angular { radius: f64::NAN },
            DedupStrategy::Angular { radius: 1e9 },
        ] {
            assert!(!strategy.is_valid());
            assert_eq!(deduplicate_with_rng(&input, strategy, &mut rng), input);
        }
        assert!(DedupStrategy::Jitter { epsilon: -0.5 }.is_valid());
    }

    #[test]
    fn test_negative_zero_groups_with_zero() {
        let input = vec![Point::new("a", 0.0, 5.0), Point::new("b", -0.0, 5.0)];
        let out = deduplicate_coordinates(&input, DedupStrategy::angular());
        assert_ne!(out[0].lon, out[1].lon);
    }

    #[test]
    fn test_nan_never_groups() {
        let input = vec![Point::new("a", f64::NAN, 5.0), Point::new("b", f64::NAN, 5.0)];
        let out = deduplicate_coordinates(&input, DedupStrategy::angular());
        assert_eq!(out[0].lon, 5.0);
        assert_eq!(out[1].lon, 5.0);
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let coords = [
            Coordinate::new(1.0, 1.0),
            Coordinate::new(2.0, 2.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(2.0, 2.0),
            Coordinate::new(3.0, 3.0),
        ];
        assert_eq!(coincident_groups(&coords), vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_point_metadata_flattens() {
        let p = Point::new("Bethel", 31.93, 35.22).with_meta("event", "Jacob's dream");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["event"], "Jacob's dream");
        assert_eq!(json["name"], "Bethel");
    }
}
