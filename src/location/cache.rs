//! File-based geocoding cache at ~/.atlas/geocode_cache.json.
//!
//! The file is one JSON object mapping place keys to `{"lat", "lon"}`.
//! It is read in full on load and rewritten in full after every insert.
//! Entries never expire. Keys are case-sensitive.
//!
//! No locking: two processes writing the same file race and the last
//! writer wins.

use super::providers::Lookup;
use super::types::{CacheError, Coordinate, GeocodeError, LookupSource, ResolvedCoordinate};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The geocoding cache.
pub struct GeocodeCache {
    path: PathBuf,
    entries: HashMap<String, Coordinate>,
}

impl GeocodeCache {
    /// Load cache from the default location (~/.atlas/geocode_cache.json).
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load cache from a specific path. A missing file yields an empty cache.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::read_file(&path);
        debug!(path = %path.display(), entries = entries.len(), "geocode cache loaded");
        Self { path, entries }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".atlas")
            .join("geocode_cache.json")
    }

    /// Where an unreadable cache file is copied before it can be overwritten.
    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    fn read_file(path: &Path) -> HashMap<String, Coordinate> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "geocode cache unreadable, starting empty");
                Self::back_up(path);
                return HashMap::new();
            }
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "geocode cache malformed, starting empty");
            Self::back_up(path);
            HashMap::new()
        })
    }

    fn back_up(path: &Path) {
        let backup = path.with_extension("json.bak");
        match fs::copy(path, &backup) {
            Ok(_) => warn!(backup = %backup.display(), "previous cache file kept"),
            Err(e) => warn!(backup = %backup.display(), error = %e, "previous cache file could not be kept"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Coordinate> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace an entry and persist the whole mapping.
    ///
    /// Out-of-range or non-finite coordinates are rejected. A valid entry
    /// stays in memory even if the write fails.
    pub fn insert(&mut self, key: impl Into<String>, coord: Coordinate) -> Result<(), CacheError> {
        let key = key.into();
        // serde_json writes non-finite floats as null, which would make the
        // whole file unreadable on the next load.
        if !coord.is_valid() {
            return Err(CacheError::InvalidCoordinate { key, lat: coord.lat, lon: coord.lon });
        }
        self.entries.insert(key, coord);
        self.save()
    }

    /// Write the full mapping to disk, replacing the previous file.
    ///
    /// Writes a sibling temp file and renames it over the target, so a
    /// failed write leaves the old file intact.
    pub fn save(&self) -> Result<(), CacheError> {
        let io_err = |path: &Path, source: std::io::Error| CacheError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_err(&self.path, e)
        })
    }

    /// Resolve a place, using `key` as the lookup query.
    pub fn resolve<L>(&mut self, key: &str, lookup: &L) -> Result<ResolvedCoordinate, GeocodeError>
    where
        L: Lookup + ?Sized,
    {
        self.resolve_as(key, key, lookup)
    }

    /// Resolve a place stored under `key`, querying the lookup with `query`.
    ///
    /// A hit never calls the lookup. A miss calls it exactly once; only a
    /// found, in-range coordinate is cached. Empty results and lookup errors leave the
    /// cache untouched and are not retried.
    pub fn resolve_as<L>(
        &mut self,
        key: &str,
        query: &str,
        lookup: &L,
    ) -> Result<ResolvedCoordinate, GeocodeError>
    where
        L: Lookup + ?Sized,
    {
        if key.trim().is_empty() {
            return Err(GeocodeError::EmptyKey);
        }

        if let Some(coordinate) = self.get(key) {
            debug!(key, "geocode cache hit");
            return Ok(ResolvedCoordinate { coordinate, source: LookupSource::Cache });
        }

        debug!(key, query, "geocode cache miss");
        let coordinate = lookup
            .lookup(query)?
            .ok_or_else(|| GeocodeError::NotFound(key.to_string()))?;

        if !coordinate.is_valid() {
            warn!(key, lat = coordinate.lat, lon = coordinate.lon, "geocoder returned an unusable coordinate");
            return Err(GeocodeError::InvalidResponse(format!(
                "coordinate out of range for '{}': {}, {}",
                key, coordinate.lat, coordinate.lon
            )));
        }

        if let Err(e) = self.insert(key, coordinate) {
            warn!(key, error = %e, "resolved coordinate not persisted");
        }

        Ok(ResolvedCoordinate { coordinate, source: LookupSource::Lookup })
    }
}
