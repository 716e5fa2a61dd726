use serde::{Deserialize, Serialize};

/// Where a fetcher's answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fresh cache entry
    Cache,
    /// Expired entry served while offline or throttled
    StaleCache,
    /// Fetched from an upstream just now
    Live,
    /// Synthesized locally because live data was unavailable
    Fallback,
    /// Nothing sensible to show (e.g. no usable coordinates)
    Unavailable,
}

/// A fetcher result. Fetchers always produce one; failures become
/// `Fallback` or `Unavailable` content instead of errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: DataSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: DataSource) -> Self {
        Self { value, source }
    }

    pub fn live(value: T) -> Self {
        Self::new(value, DataSource::Live)
    }

    pub fn cached(value: T) -> Self {
        Self::new(value, DataSource::Cache)
    }

    pub fn stale(value: T) -> Self {
        Self::new(value, DataSource::StaleCache)
    }

    pub fn fallback(value: T) -> Self {
        Self::new(value, DataSource::Fallback)
    }

    pub fn unavailable(value: T) -> Self {
        Self::new(value, DataSource::Unavailable)
    }
}
