//! Integration tests for PoiFetcher using wiremock.

use std::sync::Arc;

use wayfarer_cache::{CacheStore, NamespacePolicies};
use wayfarer_core::Config;
use wayfarer_fetch::{DataSource, FetchRuntime};
use wayfarer_places::{PoiCategory, PoiFetcher};
use wiremock::matchers::{any, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SANTA_CRUZ: (f64, f64) = (28.4578, -16.2637);
const MADRID: (f64, f64) = (40.4168, -3.7038);

fn test_config(mirrors: &[&MockServer]) -> Config {
    let mut config = Config::default();
    config.places.overpass_endpoints = mirrors
        .iter()
        .map(|m| format!("{}/api/interpreter", m.uri()))
        .collect();
    config.network.backoff_base_ms = 1;
    config.network.backoff_cap_ms = 5;
    config.network.attempt_timeout_secs = 2;
    config.throttle.places_secs = 0;
    config
}

fn build(config: &Config) -> (PoiFetcher, FetchRuntime) {
    let cache = CacheStore::in_memory(NamespacePolicies::from_config(&config.cache)).unwrap();
    let runtime = FetchRuntime::from_config(config, Arc::new(cache)).unwrap();
    (PoiFetcher::new(runtime.clone(), &config.places), runtime)
}

fn overpass_body() -> serde_json::Value {
    serde_json::json!({
        "version": 0.6,
        "elements": [
            { "type": "node", "id": 101, "lat": 40.4153, "lon": -3.7074,
              "tags": { "name": "Plaza Mayor", "tourism": "attraction" } },
            { "type": "way", "id": 202, "center": { "lat": 40.4180, "lon": -3.7143 },
              "tags": { "name": "Palacio Real", "historic": "palace", "tourism": "attraction" } },
            { "type": "node", "id": 303, "lat": 40.4169, "lon": -3.7035,
              "tags": { "name": "Café Central", "amenity": "cafe" } }
        ]
    })
}

async fn mount_interpreter(server: &MockServer, template: ResponseTemplate, hits: u64) {
    Mock::given(method("POST"))
        .and(path("/api/interpreter"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("data=%5Bout%3Ajson%5D"))
        .respond_with(template)
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_santa_cruz_offline_returns_seed_list() {
    let mirror = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mirror)
        .await;

    let config = test_config(&[&mirror]);
    let (fetcher, runtime) = build(&config);
    runtime.connectivity().set_online(false);

    let result = fetcher.nearby(SANTA_CRUZ.0, SANTA_CRUZ.1, 20_000).await;

    assert_eq!(result.source, DataSource::Fallback);
    assert_eq!(result.value.len(), 15);
    assert!(result.value.iter().all(|p| p.is_interesting));
    assert!(result.value.iter().any(|p| p.name == "Auditorio de Tenerife"));
    assert!(result
        .value
        .windows(2)
        .all(|w| w[0].distance_m <= w[1].distance_m));
}

#[tokio::test]
async fn test_failing_mirror_rotates_to_next() {
    let broken = MockServer::start().await;
    let healthy = MockServer::start().await;
    mount_interpreter(&broken, ResponseTemplate::new(504), 1).await;
    mount_interpreter(
        &healthy,
        ResponseTemplate::new(200).set_body_json(overpass_body()),
        1,
    )
    .await;

    let config = test_config(&[&broken, &healthy]);
    let (fetcher, _) = build(&config);

    let result = fetcher.nearby(MADRID.0, MADRID.1, 1500).await;

    assert_eq!(result.source, DataSource::Live);
    let names: Vec<_> = result.value.iter().map(|p| p.name.as_str()).collect();
    // Interesting first by distance, the café last
    assert_eq!(names, vec!["Plaza Mayor", "Palacio Real", "Café Central"]);
    assert_eq!(result.value[1].category, PoiCategory::Tourism);

    // Cached under the rounded coordinates
    let again = fetcher.nearby(40.4171, -3.7041, 1500).await;
    assert_eq!(again.source, DataSource::Cache);
    assert_eq!(again.value, result.value);
}

#[tokio::test]
async fn test_malformed_body_rotates() {
    let odd = MockServer::start().await;
    let healthy = MockServer::start().await;
    mount_interpreter(
        &odd,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "remark": "timeout" })),
        1,
    )
    .await;
    mount_interpreter(
        &healthy,
        ResponseTemplate::new(200).set_body_json(overpass_body()),
        1,
    )
    .await;

    let config = test_config(&[&odd, &healthy]);
    let (fetcher, _) = build(&config);

    let result = fetcher.nearby(MADRID.0, MADRID.1, 1500).await;
    assert_eq!(result.source, DataSource::Live);
    assert_eq!(result.value.len(), 3);
}

#[tokio::test]
async fn test_total_failure_uses_ring_and_caches_it() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    mount_interpreter(&a, ResponseTemplate::new(500), 1).await;
    mount_interpreter(&b, ResponseTemplate::new(429), 1).await;

    let config = test_config(&[&a, &b]);
    let (fetcher, _) = build(&config);

    let result = fetcher.nearby(MADRID.0, MADRID.1, 1500).await;
    assert_eq!(result.source, DataSource::Fallback);
    assert_eq!(result.value.len(), 8);
    assert!(result.value.iter().all(|p| p.id.starts_with("fallback:")));

    // No second round of requests inside the fallback TTL
    let again = fetcher.nearby(MADRID.0, MADRID.1, 1500).await;
    assert_eq!(again.source, DataSource::Cache);
    assert_eq!(again.value, result.value);
}

#[tokio::test]
async fn test_empty_result_near_seeded_city_uses_seeds() {
    let mirror = MockServer::start().await;
    mount_interpreter(
        &mirror,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "elements": [] })),
        1,
    )
    .await;

    let config = test_config(&[&mirror]);
    let (fetcher, _) = build(&config);

    let result = fetcher.nearby(SANTA_CRUZ.0, SANTA_CRUZ.1, 2000).await;
    assert_eq!(result.source, DataSource::Fallback);
    assert_eq!(result.value.len(), 15);
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_request() {
    let mirror = MockServer::start().await;
    mount_interpreter(
        &mirror,
        ResponseTemplate::new(200)
            .set_body_json(overpass_body())
            .set_delay(std::time::Duration::from_millis(100)),
        1,
    )
    .await;

    let config = test_config(&[&mirror]);
    let (fetcher, _) = build(&config);

    let (a, b) = tokio::join!(
        fetcher.nearby(MADRID.0, MADRID.1, 1500),
        fetcher.nearby(MADRID.0, MADRID.1, 1500)
    );

    assert_eq!(a.source, DataSource::Live);
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_throttled_lookup_skips_network() {
    let mirror = MockServer::start().await;
    mount_interpreter(
        &mirror,
        ResponseTemplate::new(200).set_body_json(overpass_body()),
        1,
    )
    .await;

    let mut config = test_config(&[&mirror]);
    config.throttle.places_secs = 60;
    let (fetcher, _) = build(&config);

    let first = fetcher.nearby(MADRID.0, MADRID.1, 1500).await;
    assert_eq!(first.source, DataSource::Live);

    // Different radius is a different key, but the bucket is still closed
    let second = fetcher.nearby(MADRID.0, MADRID.1, 3000).await;
    assert_eq!(second.source, DataSource::Fallback);
    assert_eq!(second.value.len(), 8);
}

#[tokio::test]
async fn test_invalid_input_is_unavailable() {
    let mirror = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mirror)
        .await;

    let config = test_config(&[&mirror]);
    let (fetcher, _) = build(&config);

    assert_eq!(
        fetcher.nearby(95.0, 0.0, 1000).await.source,
        DataSource::Unavailable
    );
    let zero = fetcher.nearby(MADRID.0, MADRID.1, 0).await;
    assert_eq!(zero.source, DataSource::Unavailable);
    assert!(zero.value.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_staggered_lookups_across_threads_hit_upstream_once() {
    let mirror = MockServer::start().await;
    mount_interpreter(
        &mirror,
        ResponseTemplate::new(200)
            .set_body_json(overpass_body())
            .set_delay(std::time::Duration::from_millis(40)),
        1,
    )
    .await;

    let config = test_config(&[&mirror]);
    let (fetcher, _) = build(&config);

    // Arrivals spread around the moment the first lookup completes
    let handles: Vec<_> = (0..32u64)
        .map(|i| {
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(i * 3)).await;
                fetcher.nearby(MADRID.0, MADRID.1, 1500).await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.value.len(), 3);
        assert_ne!(result.source, DataSource::Fallback);
    }
}
