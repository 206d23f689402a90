//! Core types for the geocoding subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A WGS84 position in decimal degrees.
///
/// Serializes as `{"lat": .., "lon": ..}`, which is also the value format
/// of the cache file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both components are finite and inside the lat/lon ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Parses the `"lat, lon"` form used by route tables, e.g. `"31.7683, 35.2137"`.
impl FromStr for Coordinate {
    type Err = GeocodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GeocodeError::InvalidCoordinate(s.to_string());
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
        let coord = Coordinate::new(lat, lon);
        if !coord.is_valid() {
            return Err(invalid());
        }
        Ok(coord)
    }
}

/// Where a resolved coordinate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupSource {
    Cache,
    Lookup,
    Input,
}

impl fmt::Display for LookupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Lookup => write!(f, "lookup"),
            Self::Input => write!(f, "input"),
        }
    }
}

/// A coordinate together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCoordinate {
    pub coordinate: Coordinate,
    pub source: LookupSource,
}

/// Geocoding outcomes other than a coordinate.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid geocoder response: {0}")]
    InvalidResponse(String),
    #[error("Not a 'lat, lon' pair: '{0}'")]
    InvalidCoordinate(String),
    #[error("Place not found: '{0}'")]
    NotFound(String),
    #[error("Cache key must not be empty")]
    EmptyKey,
}

impl GeocodeError {
    /// Whether the failure affects only this place.
    ///
    /// Lookup outcomes are recoverable; an empty key is a caller bug.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::EmptyKey)
    }
}

/// Failures while persisting the cache file.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Refusing to cache out-of-range coordinate for '{key}': {lat}, {lon}")]
    InvalidCoordinate { key: String, lat: f64, lon: f64 },
}
