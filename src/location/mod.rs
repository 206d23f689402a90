//! Geocoding subsystem.
//!
//! Resolves place keys to coordinates through a persistent JSON cache in
//! front of a pluggable lookup (Mapbox, Nominatim, or a closure).

pub mod cache;
pub mod providers;
pub mod types;

pub use cache::GeocodeCache;
pub use providers::{Lookup, MapboxGeocoder, NominatimGeocoder, Offline};
pub use types::{CacheError, Coordinate, GeocodeError, LookupSource, ResolvedCoordinate};
