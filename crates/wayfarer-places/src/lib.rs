//! Points of interest for Wayfarer
//!
//! OpenStreetMap data through the Overpass API, with curated seed data and a
//! procedural ring as fallbacks.

pub mod classify;
pub mod fallback;
pub mod fetcher;
pub mod geo;
pub mod overpass;
pub mod seeds;
pub mod types;

pub use classify::{classify, Classification, TagKey};
pub use fetcher::{PoiFetcher, PoiResult, MAX_RADIUS_M};
pub use geo::haversine_m;
pub use types::{Poi, PoiCategory};
