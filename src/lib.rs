//! Geocoding cache and marker layout for region and route maps.

pub mod boundaries;
pub mod layout;
pub mod location;
pub mod regions;
pub mod routes;
