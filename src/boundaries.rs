//! State outlines from GeoJSON and the label anchors derived from them.
//!
//! Outlines are a `FeatureCollection` of `Polygon`/`MultiPolygon`
//! features. A state row matches a feature by `id` (`"06"` and `6` are the
//! same id) and otherwise by the feature's `name` property.

use crate::layout::{label_point, Point};
use crate::location::Coordinate;
use crate::regions::{Region, RegionTable};
use geojson::feature::Id;
use geojson::{Feature, GeoJson, Geometry, Value};
use serde::Serialize;
use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Simplified US state outlines with two-digit FIPS ids.
pub const US_STATES_URL: &str =
    "https://cdn.jsdelivr.net/gh/PublicaMundi/MappingAPI@master/data/geojson/us-states.json";

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Boundary download failed: {0}")]
    Network(String),
    #[error("Invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("Expected a FeatureCollection")]
    NotFeatureCollection,
}

/// Features of a boundary file.
#[derive(Debug, Clone, Default)]
pub struct Outlines {
    features: Vec<Feature>,
}

impl Outlines {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BoundaryError> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|source| BoundaryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let geojson = GeoJson::from_reader(BufReader::new(file)).map_err(geojson::Error::from)?;
        Self::from_geojson(geojson)
    }

    pub fn from_geojson(geojson: GeoJson) -> Result<Self, BoundaryError> {
        match geojson {
            GeoJson::FeatureCollection(collection) => Ok(Self { features: collection.features }),
            GeoJson::Feature(feature) => Ok(Self { features: vec![feature] }),
            GeoJson::Geometry(_) => Err(BoundaryError::NotFeatureCollection),
        }
    }

    /// Load `path`, downloading it from `url` first if it is not there yet.
    ///
    /// The download is written only after it parses, so a failed fetch
    /// never leaves a broken file behind.
    pub fn fetch_or_load(path: impl AsRef<Path>, url: &str, timeout: Duration) -> Result<Self, BoundaryError> {
        let path = path.as_ref();
        if path.is_file() {
            return Self::from_path(path);
        }

        info!(url, path = %path.display(), "downloading boundaries");
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let body = agent
            .get(url)
            .call()
            .map_err(|e| BoundaryError::Network(e.to_string()))?
            .into_string()
            .map_err(|e| BoundaryError::Network(e.to_string()))?;
        let geojson: GeoJson = body.parse()?;
        let outlines = Self::from_geojson(geojson)?;

        let io_err = |p: &Path, source: std::io::Error| BoundaryError::Io {
            path: p.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::write(path, body).map_err(|e| io_err(path, e))?;
        Ok(outlines)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Outer rings of the feature matching `region`, if any.
    pub fn rings_for(&self, region: &Region) -> Option<Vec<Vec<Coordinate>>> {
        let feature = self
            .features
            .iter()
            .find(|f| feature_id(f).is_some_and(|id| same_id(&id, &region.id)))
            .or_else(|| {
                self.features
                    .iter()
                    .find(|f| feature_name(f).is_some_and(|name| name.eq_ignore_ascii_case(region.name.trim())))
            })?;
        feature.geometry.as_ref().map(outer_rings)
    }
}

fn feature_id(feature: &Feature) -> Option<String> {
    match feature.id.as_ref()? {
        Id::String(s) => Some(s.clone()),
        Id::Number(n) => Some(n.to_string()),
    }
}

fn feature_name(feature: &Feature) -> Option<&str> {
    feature.property("name").and_then(|v| v.as_str())
}

fn same_id(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// Outer ring of every polygon in a geometry. Holes are dropped; other
/// geometry types yield nothing.
pub fn outer_rings(geometry: &Geometry) -> Vec<Vec<Coordinate>> {
    let ring = |positions: &Vec<Vec<f64>>| -> Vec<Coordinate> {
        positions
            .iter()
            .filter_map(|p| match p.as_slice() {
                [lon, lat, ..] => Some(Coordinate::new(*lat, *lon)),
                _ => None,
            })
            .collect()
    };

    match &geometry.value {
        Value::Polygon(rings) => rings.first().map(ring).into_iter().collect(),
        Value::MultiPolygon(polygons) => polygons.iter().filter_map(|rings| rings.first().map(ring)).collect(),
        _ => Vec::new(),
    }
}

/// Label anchors for the state rows, and the states with no outline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateLabels {
    pub labels: Vec<Point>,
    pub unmatched: Vec<String>,
}

/// Anchor each state's label at the centroid of its largest outline part.
pub fn state_labels(table: &RegionTable, outlines: &Outlines) -> StateLabels {
    let mut out = StateLabels::default();

    for state in table.states() {
        match outlines.rings_for(state).and_then(|rings| label_point(&rings)) {
            Some(anchor) => out.labels.push(
                Point::new(state.name.clone(), anchor.lat, anchor.lon)
                    .with_meta("id", state.id.clone())
                    .with_meta("state_iso", state.state_iso.clone()),
            ),
            None => {
                debug!(id = %state.id, name = %state.name, "no outline for state");
                out.unmatched.push(state.id.clone());
            }
        }
    }

    if !out.unmatched.is_empty() {
        warn!(unmatched = out.unmatched.len(), "states without an outline");
    }
    out
}
