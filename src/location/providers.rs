//! Lookup capability and the remote geocoders behind it.
//!
//! A lookup answers one free-text query with zero or one coordinate.
//! Anything that can do that (a closure in tests, Mapbox, Nominatim)
//! plugs into [`GeocodeCache::resolve`](super::cache::GeocodeCache::resolve).

use super::types::{Coordinate, GeocodeError};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const MAPBOX_BASE: &str = "https://api.mapbox.com";
const NOMINATIM_BASE: &str = "https://nominatim.openstreetmap.org";
const USER_AGENT: &str = "AtlasGeocode/0.1 (map-layout)";

/// A single external geocoding query.
pub trait Lookup {
    fn lookup(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError>;
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Result<Option<Coordinate>, GeocodeError>,
{
    fn lookup(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        self(query)
    }
}

/// Never finds anything; used for cache-only runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Lookup for Offline {
    fn lookup(&self, _query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        Ok(None)
    }
}

// ─── Mapbox ─────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct MapboxResponse {
    #[serde(default)]
    features: Vec<MapboxFeature>,
}

#[derive(Deserialize, Debug)]
struct MapboxFeature {
    /// `[lon, lat]`
    center: Vec<f64>,
}

/// Mapbox forward geocoding (`mapbox.places`), first feature only.
pub struct MapboxGeocoder {
    agent: ureq::Agent,
    token: String,
    base_url: String,
}

impl MapboxGeocoder {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_timeout(token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            token: token.into(),
            base_url: MAPBOX_BASE.to_string(),
        }
    }

    /// Point at a different host (self-hosted proxy, test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, query: &str) -> String {
        format!(
            "{}/geocoding/v5/mapbox.places/{}.json?limit=1&access_token={}",
            self.base_url,
            urlencode(query),
            urlencode(&self.token),
        )
    }
}

impl Lookup for MapboxGeocoder {
    fn lookup(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        let response = self
            .agent
            .get(&self.url(query))
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        let body: MapboxResponse = response
            .into_json()
            .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;

        mapbox_coordinate(body)
    }
}

fn mapbox_coordinate(body: MapboxResponse) -> Result<Option<Coordinate>, GeocodeError> {
    let Some(feature) = body.features.into_iter().next() else {
        return Ok(None);
    };
    match feature.center.as_slice() {
        [lon, lat] => checked(Coordinate::new(*lat, *lon)).map(Some),
        other => Err(GeocodeError::InvalidResponse(format!(
            "feature center has {} components, expected 2",
            other.len()
        ))),
    }
}

// ─── Nominatim ──────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct NominatimResult {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search, first result only. No token needed.
pub struct NominatimGeocoder {
    agent: ureq::Agent,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: NOMINATIM_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Lookup for NominatimGeocoder {
    fn lookup(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        let url = format!(
            "{}/search?q={}&format=json&limit=1",
            self.base_url,
            urlencode(query),
        );

        let response = self
            .agent
            .get(&url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        let results: Vec<NominatimResult> = response
            .into_json()
            .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;

        nominatim_coordinate(results)
    }
}

fn nominatim_coordinate(results: Vec<NominatimResult>) -> Result<Option<Coordinate>, GeocodeError> {
    let Some(first) = results.into_iter().next() else {
        return Ok(None);
    };
    let lat: f64 = first
        .lat
        .parse()
        .map_err(|_| GeocodeError::InvalidResponse(format!("bad latitude '{}'", first.lat)))?;
    let lon: f64 = first
        .lon
        .parse()
        .map_err(|_| GeocodeError::InvalidResponse(format!("bad longitude '{}'", first.lon)))?;
    checked(Coordinate::new(lat, lon)).map(Some)
}

/// `"NaN"` and `"inf"` parse as f64, so range-check every decoded position.
fn checked(coord: Coordinate) -> Result<Coordinate, GeocodeError> {
    if coord.is_valid() {
        Ok(coord)
    } else {
        Err(GeocodeError::InvalidResponse(format!("coordinate out of range: {}, {}", coord.lat, coord.lon)))
    }
}

// ─── URL encoding ───────────────────────────────────────────────

/// Percent-encode a path or query component.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
