//! OpenWeather current conditions.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use wayfarer_cache::Namespace;
use wayfarer_core::{FetchError, WeatherConfig};
use wayfarer_fetch::{
    EndpointSet, FetchRuntime, Fingerprint, RequestDeduplicator, RequestDescriptor, Resolved,
    ThrottleBucket,
};

use crate::types::{CurrentWeather, WeatherCondition};

#[derive(Debug, Deserialize)]
struct OwmResponse {
    weather: Vec<OwmCondition>,
    main: OwmMain,
    #[serde(default)]
    wind: Option<OwmWind>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    id: i32,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    humidity: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
}

pub type CurrentResult = Resolved<Option<CurrentWeather>>;

/// Current weather at a point, cached in `WEATHER` and throttled by the
/// `CurrentWeather` bucket.
#[derive(Debug, Clone)]
pub struct CurrentWeatherClient {
    runtime: FetchRuntime,
    endpoints: EndpointSet,
    api_key: Option<String>,
    dedup: RequestDeduplicator<CurrentResult>,
}

impl CurrentWeatherClient {
    pub fn new(runtime: FetchRuntime, config: &WeatherConfig) -> Self {
        let endpoints = runtime.endpoint_set("openweather", [config.openweather_base_url.clone()]);
        let dedup = runtime.deduplicator();
        Self {
            runtime,
            endpoints,
            api_key: config.openweather_api_key.clone(),
            dedup,
        }
    }

    /// Resolve current conditions. `None` when nothing is known for the point.
    pub async fn current(&self, lat: f64, lon: f64) -> CurrentResult {
        if let Err(e) = wayfarer_fetch::check_coordinates(lat, lon) {
            tracing::debug!("Skipping current weather: {}", e);
            return Resolved::unavailable(None);
        }

        let key = Fingerprint::new("weather").coords(lat, lon).build();
        if let Some(weather) = self.runtime.cache().get::<CurrentWeather>(Namespace::Weather, &key) {
            tracing::debug!("Current weather cache hit for {}", key);
            return Resolved::cached(Some(weather));
        }

        let this = self.clone();
        let fingerprint = key.clone();
        let pending = self
            .dedup
            .join_or_start(&key, move || async move { this.resolve(lat, lon, &fingerprint).await });

        pending.await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Resolved::unavailable(None)
        })
    }

    async fn resolve(&self, lat: f64, lon: f64, key: &str) -> CurrentResult {
        let cache = self.runtime.cache();

        // Stored by a lookup that completed after the caller's cache check
        if let Some(weather) = cache.get::<CurrentWeather>(Namespace::Weather, key) {
            return Resolved::cached(Some(weather));
        }

        if self.runtime.is_offline() || !self.runtime.throttle().can_call(ThrottleBucket::CurrentWeather) {
            return match cache.get_stale::<CurrentWeather>(Namespace::Weather, key) {
                Some(weather) => Resolved::stale(Some(weather)),
                None => Resolved::unavailable(None),
            };
        }

        self.runtime.throttle().record_call(ThrottleBucket::CurrentWeather);
        match self.fetch_live(lat, lon).await {
            Ok(weather) => {
                cache.set(Namespace::Weather, key, &weather, self.runtime.ttl(Namespace::Weather));
                Resolved::live(Some(weather))
            }
            Err(e) => {
                tracing::warn!("Current weather unavailable for {}: {}", key, e);
                Resolved::unavailable(None)
            }
        }
    }

    /// One live lookup through the endpoint rotation, bypassing the cache.
    pub async fn fetch_live(&self, lat: f64, lon: f64) -> Result<CurrentWeather, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::Validation("OpenWeather API key not configured".into()))?;

        let request = RequestDescriptor::get("/data/2.5/weather")
            .with_query("lat", format!("{:.4}", lat))
            .with_query("lon", format!("{:.4}", lon))
            .with_query("appid", api_key)
            .with_query("units", "metric");

        let outcome = self
            .runtime
            .rotation()
            .execute(&self.endpoints, &request, parse_current)
            .await?;
        Ok(outcome.value)
    }
}

pub(crate) fn parse_current(body: &str) -> Result<CurrentWeather, FetchError> {
    let response: OwmResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(format!("OpenWeather response: {}", e)))?;

    let code = response
        .weather
        .first()
        .map(|w| w.id)
        .ok_or_else(|| FetchError::parse("OpenWeather response has no conditions"))?;

    Ok(CurrentWeather {
        temperature: response.main.temp,
        feels_like: response.main.feels_like.unwrap_or(response.main.temp),
        humidity: response.main.humidity.unwrap_or_default(),
        wind_speed: response.wind.map(|w| w.speed).unwrap_or_default(),
        condition: WeatherCondition::from_openweather_code(code),
        condition_code: code,
        place_name: response.name.filter(|n| !n.is_empty()),
        observed_at: response
            .dt
            .and_then(|dt| DateTime::from_timestamp(dt, 0))
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_current() {
        let body = r#"{
            "weather":[{"id":802,"main":"Clouds","description":"scattered clouds"}],
            "main":{"temp":23.4,"feels_like":23.1,"humidity":64},
            "wind":{"speed":6.2,"deg":40},
            "dt":1769947200,
            "name":"Santa Cruz de Tenerife"
        }"#;
        let weather = parse_current(body).unwrap();

        assert_eq!(weather.condition, WeatherCondition::PartlyCloudy);
        assert_eq!(weather.condition_code, 802);
        assert_eq!(weather.humidity, 64);
        assert!((weather.wind_speed - 6.2).abs() < f64::EPSILON);
        assert_eq!(weather.place_name.as_deref(), Some("Santa Cruz de Tenerife"));
        assert_eq!(weather.observed_at.timestamp(), 1769947200);
    }

    #[test]
    fn test_missing_main_is_parse_error() {
        let err = parse_current(r#"{"weather":[{"id":800}]}"#).unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn test_empty_conditions_is_parse_error() {
        let err = parse_current(r#"{"weather":[],"main":{"temp":20.0}}"#).unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }
}
