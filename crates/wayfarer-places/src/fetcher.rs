//! Points of interest around a location.

use wayfarer_cache::Namespace;
use wayfarer_core::PlacesConfig;
use wayfarer_fetch::{
    EndpointSet, FetchRuntime, Fingerprint, RequestDeduplicator, Resolved, ThrottleBucket,
};

use crate::fallback::ring_around;
use crate::overpass;
use crate::seeds::seeds_for;
use crate::types::Poi;

/// Largest radius passed to Overpass, metres
pub const MAX_RADIUS_M: u32 = 50_000;

pub type PoiResult = Resolved<Vec<Poi>>;

#[derive(Debug, Clone)]
pub struct PoiFetcher {
    runtime: FetchRuntime,
    endpoints: EndpointSet,
    default_radius_m: u32,
    max_results: usize,
    dedup: RequestDeduplicator<PoiResult>,
}

impl PoiFetcher {
    pub fn new(runtime: FetchRuntime, config: &PlacesConfig) -> Self {
        Self {
            endpoints: runtime.endpoint_set("overpass", config.overpass_endpoints.clone()),
            dedup: runtime.deduplicator(),
            default_radius_m: config.default_radius_m,
            max_results: config.max_results,
            runtime,
        }
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    /// Places within the configured default radius.
    pub async fn nearby_default(&self, lat: f64, lon: f64) -> PoiResult {
        self.nearby(lat, lon, self.default_radius_m).await
    }

    /// Places within `radius_m`, interesting first then nearest.
    ///
    /// Unusable coordinates or radius give an empty `Unavailable` result
    /// without touching the network.
    pub async fn nearby(&self, lat: f64, lon: f64, radius_m: u32) -> PoiResult {
        if let Err(e) = wayfarer_fetch::check_coordinates(lat, lon) {
            tracing::debug!("Skipping POI lookup: {}", e);
            return Resolved::unavailable(Vec::new());
        }
        if radius_m == 0 || radius_m > MAX_RADIUS_M {
            tracing::debug!("Skipping POI lookup: radius {} m out of range", radius_m);
            return Resolved::unavailable(Vec::new());
        }

        let key = Fingerprint::new("pois").coords(lat, lon).part(radius_m).build();
        if let Some(pois) = self.runtime.cache().get::<Vec<Poi>>(Namespace::Poi, &key) {
            tracing::debug!("POI cache hit for {}", key);
            return Resolved::cached(pois);
        }

        let this = self.clone();
        let fingerprint = key.clone();
        let pending = self.dedup.join_or_start(&key, move || async move {
            this.resolve(lat, lon, radius_m, &fingerprint).await
        });

        pending.await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Resolved::fallback(self.fallback(lat, lon))
        })
    }

    async fn resolve(&self, lat: f64, lon: f64, radius_m: u32, key: &str) -> PoiResult {
        let cache = self.runtime.cache();

        // A lookup that finished between the caller's cache check and
        // registration has already stored its result
        if let Some(pois) = cache.get::<Vec<Poi>>(Namespace::Poi, key) {
            return Resolved::cached(pois);
        }

        if self.runtime.is_offline() {
            tracing::debug!("Offline; serving stored or fallback POIs for {}", key);
            return self.stale_or_fallback(lat, lon, key);
        }
        if !self.runtime.throttle().can_call(ThrottleBucket::Places) {
            tracing::debug!("POI lookups throttled for {}", key);
            return self.stale_or_fallback(lat, lon, key);
        }
        self.runtime.throttle().record_call(ThrottleBucket::Places);

        let request = overpass::request(lat, lon, radius_m);
        let limit = self.max_results;
        let result = self
            .runtime
            .rotation()
            .execute(&self.endpoints, &request, |body| {
                overpass::parse_response(body, (lat, lon), limit)
            })
            .await;

        match result {
            Ok(outcome) if !outcome.value.is_empty() => {
                tracing::info!(
                    "Fetched {} POIs for {} via {}",
                    outcome.value.len(),
                    key,
                    self.endpoints
                        .endpoints()
                        .get(outcome.endpoint_index)
                        .map(|e| e.label())
                        .unwrap_or_default()
                );
                cache.set(Namespace::Poi, key, &outcome.value, self.runtime.ttl(Namespace::Poi));
                Resolved::live(outcome.value)
            }
            Ok(_) => {
                tracing::info!("Overpass found nothing for {}; using fallback places", key);
                self.cache_fallback(lat, lon, key)
            }
            Err(e) => {
                tracing::warn!("POI lookup failed for {}: {}", key, e);
                self.cache_fallback(lat, lon, key)
            }
        }
    }

    fn stale_or_fallback(&self, lat: f64, lon: f64, key: &str) -> PoiResult {
        match self.runtime.cache().get_stale::<Vec<Poi>>(Namespace::Poi, key) {
            Some(pois) => Resolved::stale(pois),
            None => Resolved::fallback(self.fallback(lat, lon)),
        }
    }

    fn cache_fallback(&self, lat: f64, lon: f64, key: &str) -> PoiResult {
        let pois = self.fallback(lat, lon);
        self.runtime
            .cache()
            .set(Namespace::Poi, key, &pois, self.runtime.fallback_ttl(Namespace::Poi));
        Resolved::fallback(pois)
    }

    /// Seed data near a seeded city, otherwise the procedural ring.
    pub fn fallback(&self, lat: f64, lon: f64) -> Vec<Poi> {
        let pois = seeds_for(lat, lon).unwrap_or_else(|| ring_around(lat, lon));
        overpass::rank_and_dedup(pois, self.max_results)
    }
}
