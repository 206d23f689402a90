//! Region table loading and city placement.
//!
//! The table is a CSV with one row per state or city:
//!
//! ```text
//! id,name,type,state_iso,note[,lat,lon]
//! TX,Texas,state,TX,
//! 1,Paris,city,TX,Lamar County
//! ```
//!
//! City rows with both `lat` and `lon` are placed as-is. The rest go
//! through the geocoding cache under the key `"{name},{state_iso}"`.

use crate::layout::Point;
use crate::location::{Coordinate, GeocodeCache, GeocodeError, Lookup, LookupSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const REQUIRED_COLUMNS: &[&str] = &["id", "name", "type", "state_iso", "note"];

/// Errors that stop the whole table from loading.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Region file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Region file is missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("Region file could not be parsed: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RegionKind {
    State,
    City,
    Other(String),
}

impl RegionKind {
    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "state" => Self::State,
            "city" => Self::City,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub kind: RegionKind,
    pub state_iso: String,
    pub note: String,
    pub coordinate: Option<Coordinate>,
}

impl Region {
    /// Stable cache key; the state disambiguates same-named cities.
    pub fn cache_key(&self) -> String {
        format!("{},{}", self.name.trim(), self.state_iso.trim())
    }

    /// Free-text query sent to the geocoder.
    pub fn query(&self) -> String {
        format!("{}, {}", self.name.trim(), self.state_iso.trim())
    }
}

#[derive(Debug, Deserialize)]
struct RegionRow {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    state_iso: String,
    #[serde(default)]
    note: String,
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    lon: Option<String>,
}

impl From<RegionRow> for Region {
    fn from(row: RegionRow) -> Self {
        let parse = |cell: Option<String>| cell.and_then(|s| s.trim().parse::<f64>().ok());
        let coordinate = match (parse(row.lat), parse(row.lon)) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)).filter(Coordinate::is_valid),
            _ => None,
        };
        Region {
            id: row.id,
            name: row.name,
            kind: RegionKind::parse(&row.kind),
            state_iso: row.state_iso,
            note: row.note,
            coordinate,
        }
    }
}

/// Header names are trimmed so `" name"` matches `name` both in the
/// column check and during deserialization.
pub(crate) fn csv_reader() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.trim(csv::Trim::Headers);
    builder
}

/// All rows of a region file.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    pub regions: Vec<Region>,
}

impl RegionTable {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegionError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RegionError::MissingFile(path.to_path_buf()));
        }
        Self::from_csv(csv_reader().from_path(path)?)
    }

    pub fn from_reader<R: io::Read>(rdr: R) -> Result<Self, RegionError> {
        Self::from_csv(csv_reader().from_reader(rdr))
    }

    fn from_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Self, RegionError> {
        let headers: BTreeSet<String> = reader.headers()?.iter().map(str::to_string).collect();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|col| !headers.contains(**col))
            .map(|col| col.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RegionError::MissingColumns(missing));
        }

        let regions = reader
            .deserialize::<RegionRow>()
            .map(|row| row.map(Region::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { regions })
    }

    pub fn states(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| r.kind == RegionKind::State)
    }

    pub fn cities(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| r.kind == RegionKind::City)
    }
}

/// A city that could not be placed, and why.
#[derive(Debug, Clone, Serialize)]
pub struct Unresolved {
    pub id: String,
    pub key: String,
    pub reason: String,
}

/// Placed city markers plus the cities that were skipped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Placement {
    pub points: Vec<Point>,
    pub unresolved: Vec<Unresolved>,
}

impl Placement {
    /// "N places unresolved", or `None` when everything was placed.
    pub fn unresolved_notice(&self) -> Option<String> {
        match self.unresolved.len() {
            0 => None,
            1 => Some("1 place unresolved".to_string()),
            n => Some(format!("{} places unresolved", n)),
        }
    }
}

/// Place every city row, geocoding the ones without coordinates.
///
/// A failed lookup skips that city only.
pub fn place_cities<L>(table: &RegionTable, cache: &mut GeocodeCache, lookup: &L) -> Placement
where
    L: Lookup + ?Sized,
{
    let mut placement = Placement::default();

    for city in table.cities() {
        let resolved = match city.coordinate {
            Some(coord) => Ok((coord, LookupSource::Input)),
            None => cache
                .resolve_as(&city.cache_key(), &city.query(), lookup)
                .map(|r| (r.coordinate, r.source)),
        };

        match resolved {
            Ok((coord, source)) => placement.points.push(
                Point::new(city.name.clone(), coord.lat, coord.lon)
                    .with_meta("id", city.id.clone())
                    .with_meta("state_iso", city.state_iso.clone())
                    .with_meta("note", city.note.clone())
                    .with_meta("source", source.to_string()),
            ),
            Err(e) => {
                warn!(key = %city.cache_key(), error = %e, "city left off the map");
                placement.unresolved.push(Unresolved {
                    id: city.id.clone(),
                    key: city.cache_key(),
                    reason: unresolved_reason(&e),
                });
            }
        }
    }

    info!(
        placed = placement.points.len(),
        unresolved = placement.unresolved.len(),
        "cities placed"
    );
    placement
}

fn unresolved_reason(e: &GeocodeError) -> String {
    match e {
        GeocodeError::NotFound(_) => "no geocoder match".to_string(),
        other => other.to_string(),
    }
}
