use atlas_geocode::boundaries::{state_labels, Outlines, StateLabels, US_STATES_URL};
use atlas_geocode::layout::{deduplicate_coordinates, DedupStrategy, MAX_OFFSET};
use atlas_geocode::location::{GeocodeCache, Lookup, MapboxGeocoder, NominatimGeocoder, Offline};
use atlas_geocode::regions::{place_cities, Placement, RegionTable};
use atlas_geocode::routes::{RouteSelection, RouteTable};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Atlas: lay out region and route markers for a map.
///
/// Reads a region CSV (id,name,type,state_iso,note[,lat,lon]) and/or a
/// route CSV (series, place, "lat, lon" location), geocodes city rows
/// without coordinates through a persistent cache, spreads markers that
/// land on the same spot, and prints the layers as JSON.
///
/// Examples:
///   atlas --regions database/areas_file.csv --token $MAPBOX_TOKEN
///   atlas --regions areas.csv --boundaries database/us_states_simple.geojson
///   atlas --routes database/route_data.csv --series Abraham --strategy jitter
///   atlas --regions areas.csv --offline
#[derive(Parser)]
#[command(name = "atlas", version, about, long_about = None)]
struct Cli {
    /// Region table (CSV).
    #[arg(long, required_unless_present = "routes")]
    regions: Option<PathBuf>,

    /// Route table (CSV).
    #[arg(long)]
    routes: Option<PathBuf>,

    /// Route series to show. Defaults to the first one in the table.
    #[arg(long, requires = "routes")]
    series: Option<String>,

    /// State outlines (GeoJSON) for label placement. Downloaded from
    /// --boundaries-url if the file does not exist yet.
    #[arg(long, requires = "regions")]
    boundaries: Option<PathBuf>,

    /// Where to fetch missing state outlines from.
    #[arg(long, default_value = US_STATES_URL)]
    boundaries_url: String,

    /// Geocoding service used on cache misses.
    #[arg(long, value_enum, default_value_t = Provider::Mapbox)]
    provider: Provider,

    /// Mapbox access token.
    #[arg(long, env = "MAPBOX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Cache file. Defaults to ~/.atlas/geocode_cache.json.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// How to separate markers sharing a coordinate.
    #[arg(long, value_enum, default_value_t = Strategy::Angular)]
    strategy: Strategy,

    /// Circle radius in degrees (angular strategy).
    #[arg(long, default_value_t = 0.02)]
    radius: f64,

    /// Maximum offset in degrees (jitter strategy).
    #[arg(long, default_value_t = 0.0001)]
    epsilon: f64,

    /// Per-request timeout for geocoding and boundary downloads.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Offline mode: only use the cache, local files and coordinates from the tables.
    #[arg(long)]
    offline: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Mapbox,
    Nominatim,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Angular,
    Jitter,
}

/// Everything printed to stdout. Layers that were not requested are omitted.
#[derive(Serialize, Default)]
struct MapLayers {
    #[serde(skip_serializing_if = "Option::is_none")]
    cities: Option<Placement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    states: Option<StateLabels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<RouteSelection>,
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("atlas_geocode=info,atlas=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let strategy = match cli.strategy {
        Strategy::Angular => DedupStrategy::Angular { radius: cli.radius },
        Strategy::Jitter => DedupStrategy::Jitter { epsilon: cli.epsilon },
    };
    if !strategy.is_valid() {
        fail(format!(
            "--radius and --epsilon must be finite and at most {} degrees",
            MAX_OFFSET
        ));
    }

    let mut layers = MapLayers::default();

    // ── Regions: cities and state labels ────────────────────────

    if let Some(path) = &cli.regions {
        let table = RegionTable::from_path(path).unwrap_or_else(|e| fail(e));

        let mut cache = match &cli.cache {
            Some(path) => GeocodeCache::load_from(path),
            None => GeocodeCache::load(),
        };

        let lookup = build_lookup(&cli);
        let mut placement = place_cities(&table, &mut cache, lookup.as_ref());

        if let Some(notice) = placement.unresolved_notice() {
            eprintln!("  \u{26A0}\u{FE0F}  {}", notice);
        }

        placement.points = deduplicate_coordinates(&placement.points, strategy);
        layers.cities = Some(placement);

        if let Some(path) = &cli.boundaries {
            let outlines = if cli.offline {
                Outlines::from_path(path)
            } else {
                Outlines::fetch_or_load(path, &cli.boundaries_url, Duration::from_secs(cli.timeout_secs))
            }
            .unwrap_or_else(|e| fail(e));
            layers.states = Some(state_labels(&table, &outlines));
        }
    }

    // ── Route ───────────────────────────────────────────────────

    if let Some(path) = &cli.routes {
        let table = RouteTable::from_path(path).unwrap_or_else(|e| fail(e));
        let mut route = table.select(cli.series.as_deref()).unwrap_or_else(|e| fail(e));

        if !route.skipped.is_empty() {
            eprintln!("  \u{26A0}\u{FE0F}  {} stops without a location", route.skipped.len());
        }

        // revisited places share a coordinate
        route.stops = deduplicate_coordinates(&route.stops, strategy);
        layers.route = Some(route);
    }

    // JSON to stdout
    match serde_json::to_string_pretty(&layers) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(e),
    }
}

fn build_lookup(cli: &Cli) -> Box<dyn Lookup> {
    if cli.offline {
        return Box::new(Offline);
    }

    let timeout = Duration::from_secs(cli.timeout_secs);
    match cli.provider {
        Provider::Nominatim => Box::new(NominatimGeocoder::with_timeout(timeout)),
        Provider::Mapbox => match cli.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Box::new(MapboxGeocoder::with_timeout(token, timeout)),
            None => {
                tracing::warn!("no Mapbox token (--token or MAPBOX_TOKEN); resolving from cache only");
                Box::new(Offline)
            }
        },
    }
}
