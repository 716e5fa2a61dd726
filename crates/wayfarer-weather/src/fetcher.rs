//! Weather alerts: AEMET first, OpenWeather heuristics second.

use wayfarer_cache::Namespace;
use wayfarer_core::WeatherConfig;
use wayfarer_fetch::{
    DataSource, FetchRuntime, Fingerprint, RequestDeduplicator, Resolved, ThrottleBucket,
};

use crate::aemet::AemetClient;
use crate::heuristics::alert_from_conditions;
use crate::openweather::CurrentWeatherClient;
use crate::region::aemet_area;
use crate::types::WeatherAlert;

pub type AlertsResult = Resolved<Vec<WeatherAlert>>;

#[derive(Debug, Clone)]
pub struct WeatherAlertsFetcher {
    runtime: FetchRuntime,
    aemet: AemetClient,
    current: CurrentWeatherClient,
    dedup: RequestDeduplicator<AlertsResult>,
}

impl WeatherAlertsFetcher {
    pub fn new(runtime: FetchRuntime, config: &WeatherConfig) -> Self {
        Self {
            aemet: AemetClient::new(runtime.clone(), config),
            current: CurrentWeatherClient::new(runtime.clone(), config),
            dedup: runtime.deduplicator(),
            runtime,
        }
    }

    /// Client for current conditions, shared with the alert heuristics.
    pub fn current_weather(&self) -> &CurrentWeatherClient {
        &self.current
    }

    /// Active alerts near a point. Never fails; an empty list means either
    /// no alerts or no reachable source (see the `source`).
    pub async fn alerts(&self, lat: f64, lon: f64) -> AlertsResult {
        if let Err(e) = wayfarer_fetch::check_coordinates(lat, lon) {
            tracing::debug!("Skipping alerts: {}", e);
            return Resolved::unavailable(Vec::new());
        }

        let key = Fingerprint::new("alerts").coords(lat, lon).build();
        if let Some(alerts) = self.runtime.cache().get::<Vec<WeatherAlert>>(Namespace::Alerts, &key) {
            tracing::debug!("Alerts cache hit for {}", key);
            return Resolved::cached(alerts);
        }

        let this = self.clone();
        let fingerprint = key.clone();
        let pending = self
            .dedup
            .join_or_start(&key, move || async move { this.resolve(lat, lon, &fingerprint).await });

        pending.await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Resolved::fallback(Vec::new())
        })
    }

    async fn resolve(&self, lat: f64, lon: f64, key: &str) -> AlertsResult {
        let cache = self.runtime.cache();
        let throttle = self.runtime.throttle();

        // A lookup that finished between the caller's cache check and
        // registration has already stored its result
        if let Some(alerts) = cache.get::<Vec<WeatherAlert>>(Namespace::Alerts, key) {
            return Resolved::cached(alerts);
        }
        if self.runtime.is_offline() {
            tracing::debug!("Offline; serving stored alerts for {}", key);
            return self.stale_or_empty(key);
        }

        let mut aemet_throttled = false;
        match aemet_area(lat, lon) {
            Some(area) if self.aemet.is_configured() => {
                if throttle.can_call(ThrottleBucket::Alerts) {
                    throttle.record_call(ThrottleBucket::Alerts);
                    tracing::debug!("Resolved {} to AEMET area {}", key, area);
                    match self.aemet.fetch_alerts(area).await {
                        Ok(alerts) if !alerts.is_empty() => {
                            cache.set(Namespace::Alerts, key, &alerts, self.runtime.ttl(Namespace::Alerts));
                            return Resolved::live(alerts);
                        }
                        Ok(_) => tracing::debug!("AEMET has no alerts for {}; checking conditions", key),
                        Err(e) => tracing::debug!("AEMET failed for {}: {}", key, e),
                    }
                } else if let Some(alerts) = cache.get_stale::<Vec<WeatherAlert>>(Namespace::Alerts, key) {
                    tracing::debug!("AEMET throttled; serving stored alerts for {}", key);
                    return Resolved::stale(alerts);
                } else {
                    tracing::debug!("AEMET throttled for {}; checking conditions", key);
                    aemet_throttled = true;
                }
            }
            Some(_) => tracing::debug!("AEMET API key not configured; checking conditions for {}", key),
            None => tracing::debug!("{} is outside AEMET coverage", key),
        }

        let conditions_blocked = !throttle.can_call(ThrottleBucket::CurrentWeather);
        let observation = self.current.current(lat, lon).await;
        match observation.value {
            Some(weather) => {
                let alerts: Vec<WeatherAlert> =
                    alert_from_conditions(&weather, &wayfarer_fetch::coord_key(lat, lon))
                        .into_iter()
                        .collect();
                let stale = observation.source == DataSource::StaleCache;
                // Heuristics from old conditions, or standing in for a
                // throttled AEMET, are only kept briefly
                let ttl = if stale || aemet_throttled {
                    self.runtime.fallback_ttl(Namespace::Alerts)
                } else {
                    self.runtime.ttl(Namespace::Alerts)
                };
                cache.set(Namespace::Alerts, key, &alerts, ttl);
                let source = if stale { DataSource::StaleCache } else { DataSource::Live };
                Resolved::new(alerts, source)
            }
            None if conditions_blocked => {
                tracing::debug!("Current weather throttled; serving stored alerts for {}", key);
                self.stale_or_empty(key)
            }
            None => {
                tracing::warn!("No alert source reachable for {}; caching empty list", key);
                let empty: Vec<WeatherAlert> = Vec::new();
                cache.set(
                    Namespace::Alerts,
                    key,
                    &empty,
                    self.runtime.fallback_ttl(Namespace::Alerts),
                );
                Resolved::fallback(empty)
            }
        }
    }

    fn stale_or_empty(&self, key: &str) -> AlertsResult {
        match self
            .runtime
            .cache()
            .get_stale::<Vec<WeatherAlert>>(Namespace::Alerts, key)
        {
            Some(alerts) => Resolved::stale(alerts),
            None => Resolved::fallback(Vec::new()),
        }
    }
}
