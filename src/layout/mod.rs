//! Marker layout: spreading coincident points and placing region labels.

pub mod centroid;
pub mod dedup;

pub use centroid::{label_point, polygon_area, polygon_centroid};
pub use dedup::{deduplicate_coordinates, deduplicate_with_rng, DedupStrategy, Located, Point, MAX_OFFSET};
