//! Route tables: ordered stops grouped into named series.
//!
//! Each row is one stop. The location cell holds `"lat, lon"`; every other
//! column rides along as hover metadata. Headers are matched against the
//! names the route spreadsheets use, with English aliases:
//!
//! | role     | accepted headers              |
//! |----------|-------------------------------|
//! | series   | `系列名称`, `series`          |
//! | place    | `地点名称`, `place`           |
//! | location | `位置信息(经纬度)`, `location` |
//! | score    | `信仰状态打分`, `score` (optional) |
//!
//! A stop whose location cannot be parsed stays in the table but is left
//! off the map.

use crate::layout::Point;
use crate::location::Coordinate;
use crate::regions::csv_reader;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const SERIES_COLUMNS: &[&str] = &["系列名称", "series"];
const PLACE_COLUMNS: &[&str] = &["地点名称", "place"];
const LOCATION_COLUMNS: &[&str] = &["位置信息(经纬度)", "location"];
const SCORE_COLUMNS: &[&str] = &["信仰状态打分", "score"];

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Route file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Route file is missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("Route file could not be parsed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Unknown route series '{requested}'. Available: {}", .available.join(", "))]
    UnknownSeries { requested: String, available: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStop {
    pub series: String,
    pub place: String,
    pub coordinate: Option<Coordinate>,
    pub score: Option<f64>,
    /// Remaining columns, keyed by header. Empty cells are dropped.
    pub details: BTreeMap<String, String>,
}

impl RouteStop {
    fn to_point(&self) -> Option<Point> {
        let coord = self.coordinate?;
        let mut point = Point::new(self.place.clone(), coord.lat, coord.lon).with_meta("series", self.series.clone());
        if let Some(score) = self.score {
            point = point.with_meta("score", score);
        }
        for (key, value) in &self.details {
            point = point.with_meta(key.clone(), value.clone());
        }
        Some(point)
    }
}

/// The stops of one series that made it onto the map.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSelection {
    pub series: String,
    pub stops: Vec<Point>,
    /// Places whose location cell was blank or not a `"lat, lon"` pair.
    pub skipped: Vec<String>,
    /// Mean position of the placed stops, for centering the view.
    pub center: Option<Coordinate>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    pub stops: Vec<RouteStop>,
}

impl RouteTable {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RouteError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RouteError::MissingFile(path.to_path_buf()));
        }
        Self::from_csv(csv_reader().from_path(path)?)
    }

    pub fn from_reader<R: io::Read>(rdr: R) -> Result<Self, RouteError> {
        Self::from_csv(csv_reader().from_reader(rdr))
    }

    fn from_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Self, RouteError> {
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let find = |aliases: &[&str]| headers.iter().position(|h| aliases.contains(&h.as_str()));

        let (series_idx, place_idx, location_idx) =
            match (find(SERIES_COLUMNS), find(PLACE_COLUMNS), find(LOCATION_COLUMNS)) {
                (Some(s), Some(p), Some(l)) => (s, p, l),
                (s, p, l) => {
                    let missing = [(s, SERIES_COLUMNS), (p, PLACE_COLUMNS), (l, LOCATION_COLUMNS)]
                        .iter()
                        .filter(|(idx, _)| idx.is_none())
                        .map(|(_, aliases)| aliases[0].to_string())
                        .collect();
                    return Err(RouteError::MissingColumns(missing));
                }
            };
        let score_idx = find(SCORE_COLUMNS);

        let mut stops = Vec::new();
        for record in reader.records() {
            let record = record?;
            let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

            let location = cell(location_idx);
            let coordinate = location.parse::<Coordinate>().ok();
            if coordinate.is_none() {
                debug!(place = cell(place_idx), location, "route stop without usable location");
            }

            let details = headers
                .iter()
                .enumerate()
                .filter(|(idx, _)| ![series_idx, place_idx, location_idx].contains(idx) && Some(*idx) != score_idx)
                .filter_map(|(idx, header)| {
                    let value = cell(idx);
                    (!value.is_empty()).then(|| (header.clone(), value.to_string()))
                })
                .collect();

            stops.push(RouteStop {
                series: cell(series_idx).to_string(),
                place: cell(place_idx).to_string(),
                coordinate,
                score: score_idx.and_then(|idx| cell(idx).parse::<f64>().ok()).filter(|s| s.is_finite()),
                details,
            });
        }

        Ok(Self { stops })
    }

    /// Distinct series names in first-seen order.
    pub fn series_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for stop in &self.stops {
            if !names.contains(&stop.series.as_str()) {
                names.push(&stop.series);
            }
        }
        names
    }

    /// Stops of one series as map points, in table order.
    ///
    /// `None` picks the first series, matching the default selection of the
    /// route viewer.
    pub fn select(&self, series: Option<&str>) -> Result<RouteSelection, RouteError> {
        let available = self.series_names();
        let series = match series {
            Some(name) if available.contains(&name) => name,
            None if !available.is_empty() => available[0],
            requested => {
                return Err(RouteError::UnknownSeries {
                    requested: requested.unwrap_or("").to_string(),
                    available: available.iter().map(|s| s.to_string()).collect(),
                })
            }
        };

        let mut stops = Vec::new();
        let mut skipped = Vec::new();
        for stop in self.stops.iter().filter(|s| s.series == series) {
            match stop.to_point() {
                Some(point) => stops.push(point),
                None => skipped.push(stop.place.clone()),
            }
        }
        if !skipped.is_empty() {
            warn!(series, skipped = skipped.len(), "route stops left off the map");
        }

        let center = route_center(&stops);
        Ok(RouteSelection { series: series.to_string(), stops, skipped, center })
    }
}

/// Mean position of a set of points.
pub fn route_center(points: &[Point]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
    Some(Coordinate::new(lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    const ROUTES: &str = "\
序号,系列名称,地点名称,位置信息(经纬度),主要人物,主要事件,信仰状态打分
1,Abraham,Ur,\"30.96, 46.10\",Terah,leaves Ur,3
2,Abraham,Haran,\"36.86, 39.03\",Terah,dies in Haran,1
3,Abraham,Shechem,\"32.21, 35.28\",Abram,altar,5
4,Abraham,Bethel,\"31.93, 35.22\",Abram,altar,4
5,Abraham,Bethel,\"31.93, 35.22\",Abram,returns from Egypt,
6,Jacob,Beersheba,\"31.25, 34.79\",Jacob,flees,-2
7,Jacob,Luz,unknown,Jacob,dream,
";

    #[test]
    fn test_series_in_first_seen_order() {
        let table = RouteTable::from_reader(ROUTES.as_bytes()).unwrap();
        assert_eq!(table.stops.len(), 7);
        assert_eq!(table.series_names(), vec!["Abraham", "Jacob"]);
    }

    #[test]
    fn test_select_carries_metadata() {
        let table = RouteTable::from_reader(ROUTES.as_bytes()).unwrap();
        let route = table.select(Some("Abraham")).unwrap();

        assert_eq!(route.stops.len(), 5);
        let ur = &route.stops[0];
        assert_eq!(ur.name, "Ur");
        assert_abs_diff_eq!(ur.lat, 30.96);
        assert_eq!(ur.metadata["主要事件"], "leaves Ur");
        assert_eq!(ur.metadata["序号"], "1");
        assert_eq!(ur.metadata["score"], 3.0);
        assert_eq!(ur.metadata["series"], "Abraham");
        // blank score cell is not carried
        assert!(!route.stops[4].metadata.contains_key("score"));
    }

    #[test]
    fn test_default_series_and_skipped_locations() {
        let table = RouteTable::from_reader(ROUTES.as_bytes()).unwrap();
        assert_eq!(table.select(None).unwrap().series, "Abraham");

        let jacob = table.select(Some("Jacob")).unwrap();
        assert_eq!(jacob.stops.len(), 1);
        assert_eq!(jacob.skipped, vec!["Luz"]);
        assert_eq!(jacob.center, Some(Coordinate::new(31.25, 34.79)));
    }

    #[test]
    fn test_revisited_place_is_coincident() {
        let table = RouteTable::from_reader(ROUTES.as_bytes()).unwrap();
        let route = table.select(Some("Abraham")).unwrap();
        assert_eq!(
            (route.stops[3].lat, route.stops[3].lon),
            (route.stops[4].lat, route.stops[4].lon)
        );
    }

    #[test]
    fn test_unknown_series() {
        let table = RouteTable::from_reader(ROUTES.as_bytes()).unwrap();
        match table.select(Some("Moses")) {
            Err(RouteError::UnknownSeries { requested, available }) => {
                assert_eq!(requested, "Moses");
                assert_eq!(available, vec!["Abraham", "Jacob"]);
            }
            other => panic!("expected UnknownSeries, got {:?}", other),
        }
        assert!(RouteTable::default().select(None).is_err());
    }

    #[test]
    fn test_english_headers() {
        let csv = "series,place,location\nExodus,Rameses,\"30.80, 31.83\"\n";
        let table = RouteTable::from_reader(csv.as_bytes()).unwrap();
        let route = table.select(None).unwrap();
        assert_eq!(route.stops[0].name, "Rameses");
    }

    #[test]
    fn test_missing_columns() {
        let err = RouteTable::from_reader("series,place\nA,B\n".as_bytes()).unwrap_err();
        match err {
            RouteError::MissingColumns(cols) => assert_eq!(cols, vec!["位置信息(经纬度)"]),
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = RouteTable::from_path(dir.path().join("route_data.csv")).unwrap_err();
        assert!(matches!(err, RouteError::MissingFile(_)));
    }

    #[test]
    fn test_route_center() {
        let points = vec![Point::new("a", 0.0, 0.0), Point::new("b", 2.0, 4.0)];
        assert_eq!(route_center(&points), Some(Coordinate::new(1.0, 2.0)));
        assert!(route_center(&[]).is_none());
    }
}
