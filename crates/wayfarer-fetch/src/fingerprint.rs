//! Cache and dedup key construction.
//!
//! Every domain uses the same discipline: coordinates are rounded to two
//! decimals, so queries within roughly one kilometre (1.1 km of latitude,
//! less of longitude away from the equator) share a slot. Every other input
//! that changes the answer must be added as a part.

use wayfarer_core::FetchError;

pub const COORD_DECIMALS: usize = 2;
const COORD_SCALE: f64 = 100.0;

/// Round a coordinate to the shared cache granularity.
pub fn round_coord(value: f64) -> f64 {
    // `+ 0.0` folds -0.0 into 0.0 so keys never render as "-0.00"
    (value * COORD_SCALE).round() / COORD_SCALE + 0.0
}

pub fn coord_key(lat: f64, lon: f64) -> String {
    format!(
        "{:.prec$}:{:.prec$}",
        round_coord(lat),
        round_coord(lon),
        prec = COORD_DECIMALS
    )
}

/// Reject coordinates no fetcher can do anything useful with.
pub fn check_coordinates(lat: f64, lon: f64) -> Result<(), FetchError> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(FetchError::Validation("coordinates must be finite".into()));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(FetchError::Validation(format!("latitude out of range: {}", lat)));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(FetchError::Validation(format!("longitude out of range: {}", lon)));
    }
    Ok(())
}

/// Builder for `domain:part:part...` keys.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    parts: Vec<String>,
}

impl Fingerprint {
    pub fn new(domain: &str) -> Self {
        Self {
            parts: vec![domain.to_string()],
        }
    }

    pub fn coords(mut self, lat: f64, lon: f64) -> Self {
        self.parts.push(coord_key(lat, lon));
        self
    }

    pub fn part(mut self, part: impl std::fmt::Display) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// Order-insensitive set of identifiers (empty renders as `-`).
    pub fn set<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut items: Vec<String> = items.into_iter().map(|s| s.as_ref().to_string()).collect();
        items.sort();
        items.dedup();
        self.parts.push(if items.is_empty() {
            "-".to_string()
        } else {
            items.join(",")
        });
        self
    }

    pub fn build(self) -> String {
        self.parts.join(":")
    }
}
