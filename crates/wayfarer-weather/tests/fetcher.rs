//! Integration tests for WeatherAlertsFetcher using wiremock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use wayfarer_cache::{CacheStore, Namespace, NamespacePolicies};
use wayfarer_core::{Config, ManualClock};
use wayfarer_fetch::{DataSource, FetchRuntime};
use wayfarer_weather::{AlertLevel, AlertSource, WeatherAlert, WeatherAlertsFetcher};
use wiremock::matchers::{any, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SANTA_CRUZ: (f64, f64) = (28.4578, -16.2637);
const LONDON: (f64, f64) = (51.5074, -0.1278);
const PARIS: (f64, f64) = (48.8566, 2.3522);
const LA_LAGUNA: (f64, f64) = (28.4874, -16.3159);

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.weather.aemet_base_url = server.uri();
    config.weather.aemet_api_key = Some("aemet-key".into());
    config.weather.openweather_base_url = server.uri();
    config.weather.openweather_api_key = Some("owm-key".into());
    config.network.backoff_base_ms = 1;
    config.network.backoff_cap_ms = 5;
    config.network.attempt_timeout_secs = 2;
    config.throttle.alerts_secs = 0;
    config.throttle.current_weather_secs = 0;
    config
}

fn build(config: &Config, clock: &ManualClock) -> (WeatherAlertsFetcher, FetchRuntime) {
    let cache = CacheStore::in_memory(NamespacePolicies::from_config(&config.cache))
        .unwrap()
        .with_clock(Arc::new(clock.clone()));
    let runtime = FetchRuntime::from_config(config, Arc::new(cache)).unwrap();
    (WeatherAlertsFetcher::new(runtime.clone(), &config.weather), runtime)
}

fn owm_body(code: i32, temp: f64, wind: f64) -> serde_json::Value {
    serde_json::json!({
        "weather": [{ "id": code, "main": "x", "description": "x" }],
        "main": { "temp": temp, "feels_like": temp, "humidity": 60 },
        "wind": { "speed": wind },
        "dt": 1769947200,
        "name": "Santa Cruz de Tenerife"
    })
}

async fn mount_aemet(server: &MockServer, area: &str, records: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/avisos_cap/ultimoelaborado/area/{}", area)))
        .and(query_param("api_key", "aemet-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "descripcion": "exito",
            "estado": 200,
            "datos": format!("{}/datos/{}", server.uri(), area),
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/datos/{}", area)))
        .respond_with(ResponseTemplate::new(200).set_body_json(records))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_canary_islands_query_uses_area_65() {
    let server = MockServer::start().await;
    mount_aemet(
        &server,
        "65",
        serde_json::json!([{
            "id": "2.49.0.0.724.0.ES.65",
            "zona": "Cumbres de Tenerife",
            "provincia": "Santa Cruz de Tenerife",
            "descripcion": "Rachas máximas de 90 km/h",
            "nivel": "naranja",
            "inicio": "2026-02-01T06:00:00+00:00",
            "fin": "2026-02-01T21:00:00+00:00",
            "fenomeno": "viento"
        }]),
    )
    .await;

    let config = test_config(&server);
    let (fetcher, _) = build(&config, &ManualClock::default());

    let first = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(first.source, DataSource::Live);
    assert_eq!(first.value.len(), 1);
    assert_eq!(first.value[0].source, AlertSource::Aemet);
    assert_eq!(first.value[0].level, AlertLevel::Orange);

    // Second lookup is served from the cache; the mocks expect one hit each
    let second = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(second.source, DataSource::Cache);
    assert_eq!(second.value, first.value);
}

#[tokio::test]
async fn test_empty_aemet_falls_back_to_condition_heuristics() {
    let server = MockServer::start().await;
    mount_aemet(&server, "65", serde_json::json!([])).await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("appid", "owm-key"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(owm_body(211, 22.0, 8.0)))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let (fetcher, _) = build(&config, &ManualClock::default());

    let result = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(result.source, DataSource::Live);
    assert_eq!(result.value.len(), 1);
    assert_eq!(result.value[0].source, AlertSource::OpenWeather);
    assert_eq!(result.value[0].phenomenon, "thunderstorm");
}

#[tokio::test]
async fn test_outside_aemet_coverage_skips_aemet() {
    let server = MockServer::start().await;
    Mock::given(path_regex("^/api/avisos_cap/.*"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(owm_body(800, 18.0, 3.0)))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let (fetcher, _) = build(&config, &ManualClock::default());

    let result = fetcher.alerts(LONDON.0, LONDON.1).await;
    assert_eq!(result.source, DataSource::Live);
    assert!(result.value.is_empty());
}

#[tokio::test]
async fn test_offline_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let (fetcher, runtime) = build(&config, &ManualClock::default());
    runtime.connectivity().set_online(false);

    let result = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(result.source, DataSource::Fallback);
    assert!(result.value.is_empty());
}

#[tokio::test]
async fn test_offline_serves_expired_alerts_within_ceiling() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let clock = ManualClock::default();
    let (fetcher, runtime) = build(&config, &clock);

    let stored = vec![WeatherAlert {
        source: AlertSource::Aemet,
        id: "stored".into(),
        zone: "Anaga".into(),
        province: None,
        description: "Oleaje".into(),
        level: AlertLevel::Yellow,
        start_time: None,
        end_time: None,
        phenomenon: "costeros".into(),
    }];
    let key = wayfarer_fetch::Fingerprint::new("alerts")
        .coords(SANTA_CRUZ.0, SANTA_CRUZ.1)
        .build();
    runtime.cache().set(
        Namespace::Alerts,
        &key,
        &stored,
        runtime.ttl(Namespace::Alerts),
    );
    clock.advance(ChronoDuration::hours(2));
    runtime.connectivity().set_online(false);

    let result = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(result.source, DataSource::StaleCache);
    assert_eq!(result.value, stored);
}

#[tokio::test]
async fn test_total_failure_caches_empty_fallback() {
    let server = MockServer::start().await;
    Mock::given(path_regex("^/api/avisos_cap/.*"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let clock = ManualClock::default();
    let (fetcher, runtime) = build(&config, &clock);

    let result = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(result.source, DataSource::Fallback);
    assert!(result.value.is_empty());

    // The empty list is cached, so a retry inside the fallback TTL stays local
    let again = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(again.source, DataSource::Cache);

    // ... but only for the fallback TTL, shorter than the alerts TTL
    clock.advance(ChronoDuration::minutes(11));
    let key = wayfarer_fetch::Fingerprint::new("alerts")
        .coords(SANTA_CRUZ.0, SANTA_CRUZ.1)
        .build();
    assert!(runtime
        .cache()
        .get::<Vec<WeatherAlert>>(Namespace::Alerts, &key)
        .is_none());
}

#[tokio::test]
async fn test_invalid_coordinates_are_unavailable() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let (fetcher, _) = build(&config, &ManualClock::default());

    let result = fetcher.alerts(f64::NAN, 10.0).await;
    assert_eq!(result.source, DataSource::Unavailable);
}

fn alerts_key(point: (f64, f64)) -> String {
    wayfarer_fetch::Fingerprint::new("alerts").coords(point.0, point.1).build()
}

fn tenerife_wind_warning() -> serde_json::Value {
    serde_json::json!([{
        "id": "2.49.0.0.724.0.ES.65",
        "zona": "Cumbres de Tenerife",
        "provincia": "Santa Cruz de Tenerife",
        "descripcion": "Rachas máximas de 90 km/h",
        "nivel": "naranja",
        "inicio": "2026-02-01T06:00:00+00:00",
        "fin": "2026-02-01T21:00:00+00:00",
        "fenomeno": "viento"
    }])
}

#[tokio::test]
async fn test_alerts_interval_does_not_hide_condition_alerts_elsewhere() {
    let server = MockServer::start().await;
    Mock::given(path_regex("^/api/avisos_cap/.*"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(owm_body(211, 16.0, 6.0)))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.throttle.alerts_secs = Config::default().throttle.alerts_secs;
    let (fetcher, _) = build(&config, &ManualClock::default());

    let london = fetcher.alerts(LONDON.0, LONDON.1).await;
    let paris = fetcher.alerts(PARIS.0, PARIS.1).await;

    for result in [london, paris] {
        assert_eq!(result.source, DataSource::Live);
        assert_eq!(result.value.len(), 1);
        assert_eq!(result.value[0].source, AlertSource::OpenWeather);
    }
}

#[tokio::test]
async fn test_throttled_aemet_serves_stored_alerts_without_rewriting() {
    let server = MockServer::start().await;
    mount_aemet(&server, "65", tenerife_wind_warning()).await;
    Mock::given(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.throttle.alerts_secs = Config::default().throttle.alerts_secs;
    let clock = ManualClock::default();
    let (fetcher, runtime) = build(&config, &clock);

    let first = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(first.source, DataSource::Live);

    // Past the alerts TTL, still inside the AEMET interval
    clock.advance(ChronoDuration::minutes(20));
    let second = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(second.source, DataSource::StaleCache);
    assert_eq!(second.value, first.value);

    let age = runtime
        .cache()
        .age_of(Namespace::Alerts, &alerts_key(SANTA_CRUZ))
        .unwrap();
    assert!(age >= Duration::from_secs(20 * 60), "entry was rewritten: {:?}", age);
}

#[tokio::test]
async fn test_throttled_aemet_without_stored_alerts_uses_conditions_briefly() {
    let server = MockServer::start().await;
    mount_aemet(&server, "65", tenerife_wind_warning()).await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(owm_body(211, 21.0, 5.0)))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.throttle.alerts_secs = Config::default().throttle.alerts_secs;
    let clock = ManualClock::default();
    let (fetcher, runtime) = build(&config, &clock);

    let santa_cruz = fetcher.alerts(SANTA_CRUZ.0, SANTA_CRUZ.1).await;
    assert_eq!(santa_cruz.value[0].source, AlertSource::Aemet);

    let la_laguna = fetcher.alerts(LA_LAGUNA.0, LA_LAGUNA.1).await;
    assert_eq!(la_laguna.source, DataSource::Live);
    assert_eq!(la_laguna.value.len(), 1);
    assert_eq!(la_laguna.value[0].source, AlertSource::OpenWeather);

    // Kept for the fallback TTL only, so AEMET is asked once it is allowed again
    clock.advance(ChronoDuration::minutes(11));
    assert!(runtime
        .cache()
        .get::<Vec<WeatherAlert>>(Namespace::Alerts, &alerts_key(LA_LAGUNA))
        .is_none());
}

#[tokio::test]
async fn test_alerts_from_stale_conditions_use_fallback_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(owm_body(211, 16.0, 6.0)))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.throttle.current_weather_secs = Config::default().throttle.current_weather_secs;
    let clock = ManualClock::default();
    let (fetcher, runtime) = build(&config, &clock);

    let first = fetcher.alerts(LONDON.0, LONDON.1).await;
    assert_eq!(first.source, DataSource::Live);

    // Both the alerts and the observation have expired; the weather
    // interval keeps OpenWeather from being asked again
    clock.advance(ChronoDuration::minutes(20));
    let second = fetcher.alerts(LONDON.0, LONDON.1).await;
    assert_eq!(second.source, DataSource::StaleCache);
    assert_eq!(second.value, first.value);

    clock.advance(ChronoDuration::minutes(11));
    assert!(runtime
        .cache()
        .get::<Vec<WeatherAlert>>(Namespace::Alerts, &alerts_key(LONDON))
        .is_none());
}

#[tokio::test]
async fn test_throttled_current_weather_serves_stale_without_writing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(owm_body(800, 19.0, 2.0)))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.throttle.current_weather_secs = Config::default().throttle.current_weather_secs;
    let clock = ManualClock::default();
    let (fetcher, runtime) = build(&config, &clock);
    let client = fetcher.current_weather();

    let first = client.current(LONDON.0, LONDON.1).await;
    assert_eq!(first.source, DataSource::Live);

    clock.advance(ChronoDuration::minutes(11));
    let second = client.current(LONDON.0, LONDON.1).await;
    assert_eq!(second.source, DataSource::StaleCache);
    assert_eq!(second.value, first.value);

    // Nothing stored for this point, and the interval still blocks a request
    let elsewhere = client.current(PARIS.0, PARIS.1).await;
    assert_eq!(elsewhere.source, DataSource::Unavailable);
    assert!(elsewhere.value.is_none());
    assert_eq!(runtime.cache().len(Namespace::Weather), 1);
}
