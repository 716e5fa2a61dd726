//! Endpoint rotation with exponential backoff.
//!
//! One logical upstream may have several equivalent endpoints (Overpass
//! mirrors, completion gateways, dev CORS proxies). `EndpointRotation`
//! tries them in order, one attempt each:
//! - every attempt is bounded by `attempt_timeout` (headers and body)
//! - non-2xx, transport errors, timeouts, and 2xx bodies rejected by the
//!   caller's parser all move on to the next endpoint
//! - attempts after the first wait `min(base * factor^n, cap)`
//!
//! Exhausting the set is reported to the caller, who owns the fallback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response};
use thiserror::Error;
use wayfarer_core::{FetchError, NetworkConfig, NetworkError, ReqwestErrorExt};

/// Default backoff configuration
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 8000;
pub const DEFAULT_FACTOR: f64 = 1.5;
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 10;

const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the second attempt
    pub base: Duration,
    /// Growth per attempt
    pub factor: f64,
    /// Maximum delay between attempts
    pub cap: Duration,
    /// Upper bound for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            factor: DEFAULT_FACTOR,
            cap: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, attempt_timeout: Duration) -> Self {
        Self {
            base,
            factor: DEFAULT_FACTOR,
            cap,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            base: config.backoff_base(),
            factor: config.backoff_factor.max(1.0),
            cap: config.backoff_cap(),
            attempt_timeout: config.attempt_timeout(),
        }
    }

    /// Delay for a given retry number: `min(base * factor^attempt, cap)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.base.as_millis() as f64 * self.factor.powi(exponent);
        let capped = delay_ms.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }
}

/// One concrete way to reach an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    proxy: Option<String>,
}

impl Endpoint {
    pub fn direct(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            proxy: None,
        }
    }

    /// `proxy` is a template with a `{url}` placeholder, or a prefix the
    /// encoded target URL is appended to.
    pub fn proxied(base: impl Into<String>, proxy: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            proxy: Some(proxy.into()),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_proxied(&self) -> bool {
        self.proxy.is_some()
    }

    /// Log-safe description (no query string, so no API keys).
    pub fn label(&self) -> String {
        match &self.proxy {
            Some(proxy) => {
                let host = proxy.split('?').next().unwrap_or(proxy);
                format!("{} via {}", self.base, host)
            }
            None => self.base.clone(),
        }
    }

    pub fn url_for(&self, request: &RequestDescriptor) -> String {
        let mut target = if request.path.is_empty() {
            self.base.clone()
        } else {
            format!(
                "{}/{}",
                self.base.trim_end_matches('/'),
                request.path.trim_start_matches('/')
            )
        };

        if !request.query.is_empty() {
            let query = request
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            target.push(if target.contains('?') { '&' } else { '?' });
            target.push_str(&query);
        }

        match &self.proxy {
            Some(proxy) if proxy.contains("{url}") => {
                proxy.replace("{url}", &urlencoding::encode(&target))
            }
            Some(proxy) => format!("{}{}", proxy, urlencoding::encode(&target)),
            None => target,
        }
    }
}

/// Ordered, equivalent endpoints for one logical upstream.
///
/// The cursor remembers the last endpoint that succeeded; clones share it.
#[derive(Debug, Clone)]
pub struct EndpointSet {
    name: String,
    endpoints: Vec<Endpoint>,
    cursor: Arc<AtomicUsize>,
}

impl EndpointSet {
    pub fn new(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            name: name.into(),
            endpoints,
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_urls<I, S>(name: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, urls.into_iter().map(Endpoint::direct).collect())
    }

    /// Append the primary endpoint fronted by each dev CORS proxy.
    pub fn with_dev_proxies(mut self, proxies: &[String]) -> Self {
        let Some(primary) = self.endpoints.iter().find(|e| !e.is_proxied()).cloned() else {
            return self;
        };
        for proxy in proxies {
            self.endpoints
                .push(Endpoint::proxied(primary.base.clone(), proxy.clone()));
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// The endpoint tried first on the next rotation.
    pub fn current(&self) -> Option<&Endpoint> {
        self.endpoints.get(self.cursor() % self.len().max(1))
    }

    /// Endpoint indices in attempt order: from the cursor, wrapping.
    pub fn attempt_order(&self) -> Vec<usize> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        let start = self.cursor() % len;
        (0..len).map(|i| (start + i) % len).collect()
    }

    fn mark_success(&self, index: usize) {
        self.cursor.store(index, Ordering::Relaxed);
    }
}

/// Method, path suffix, query, headers, body. Appended to each endpoint base.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestDescriptor {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// What happened on one attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub endpoint_index: usize,
    pub endpoint: String,
    pub delay_before: Duration,
    pub error: Option<FetchError>,
}

#[derive(Debug, Clone)]
pub struct RotationOutcome<T> {
    pub value: T,
    pub endpoint_index: usize,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, Error)]
pub enum RotationError {
    #[error("No endpoints configured for {0}")]
    NoEndpoints(String),

    #[error("All {} endpoint attempts for {set} failed", .attempts.len())]
    Exhausted {
        set: String,
        attempts: Vec<AttemptRecord>,
    },
}

impl RotationError {
    pub fn last_error(&self) -> Option<&FetchError> {
        match self {
            RotationError::NoEndpoints(_) => None,
            RotationError::Exhausted { attempts, .. } => {
                attempts.iter().rev().find_map(|a| a.error.as_ref())
            }
        }
    }
}

impl From<RotationError> for FetchError {
    fn from(e: RotationError) -> Self {
        match e.last_error() {
            Some(last) => last.clone(),
            None => FetchError::Validation(e.to_string()),
        }
    }
}

/// Executes requests against endpoint sets.
#[derive(Debug, Clone)]
pub struct EndpointRotation {
    client: Client,
    policy: BackoffPolicy,
}

impl EndpointRotation {
    pub fn new(client: Client, policy: BackoffPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Try each endpoint once, in order from the set's cursor.
    ///
    /// `parse` turns a 2xx body into a value; rejecting it rotates just like
    /// a network failure.
    pub async fn execute<T, F>(
        &self,
        set: &EndpointSet,
        request: &RequestDescriptor,
        parse: F,
    ) -> Result<RotationOutcome<T>, RotationError>
    where
        F: Fn(&str) -> Result<T, FetchError>,
    {
        let order = set.attempt_order();
        if order.is_empty() {
            return Err(RotationError::NoEndpoints(set.name().to_string()));
        }

        let mut attempts = Vec::with_capacity(order.len());

        for (n, index) in order.into_iter().enumerate() {
            let endpoint = &set.endpoints()[index];
            let delay_before = if n == 0 {
                Duration::ZERO
            } else {
                self.policy.delay_for_attempt(n as u32 - 1)
            };

            if !delay_before.is_zero() {
                tracing::info!(
                    "{}: attempt {} in {:?} via {}",
                    set.name(),
                    n + 1,
                    delay_before,
                    endpoint.label()
                );
                tokio::time::sleep(delay_before).await;
            }

            match self.attempt(endpoint, request, &parse).await {
                Ok(value) => {
                    if n > 0 {
                        tracing::info!(
                            "{}: succeeded via {} after {} failed attempts",
                            set.name(),
                            endpoint.label(),
                            n
                        );
                    }
                    set.mark_success(index);
                    attempts.push(AttemptRecord {
                        endpoint_index: index,
                        endpoint: endpoint.label(),
                        delay_before,
                        error: None,
                    });
                    return Ok(RotationOutcome {
                        value,
                        endpoint_index: index,
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "{}: attempt {} via {} failed ({}): {}",
                        set.name(),
                        n + 1,
                        endpoint.label(),
                        if e.is_transient() { "transient" } else { "permanent" },
                        e
                    );
                    attempts.push(AttemptRecord {
                        endpoint_index: index,
                        endpoint: endpoint.label(),
                        delay_before,
                        error: Some(e),
                    });
                }
            }
        }

        tracing::error!(
            "{}: all {} endpoint attempts exhausted",
            set.name(),
            attempts.len()
        );
        Err(RotationError::Exhausted {
            set: set.name().to_string(),
            attempts,
        })
    }

    /// One bounded attempt: send, require 2xx, read the body, parse it.
    pub async fn attempt<T, F>(
        &self,
        endpoint: &Endpoint,
        request: &RequestDescriptor,
        parse: &F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, FetchError>,
    {
        let work = async {
            let response = self.send(endpoint, request).await?;
            let body = response.text().await.map_err(|e| e.into_fetch_error())?;
            parse(&body)
        };

        match tokio::time::timeout(self.policy.attempt_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Network(NetworkError::Timeout)),
        }
    }

    /// Send and require a 2xx, leaving the body unread. The caller bounds
    /// the time spent reading it.
    pub async fn open(
        &self,
        endpoint: &Endpoint,
        request: &RequestDescriptor,
    ) -> Result<Response, FetchError> {
        match tokio::time::timeout(self.policy.attempt_timeout, self.send(endpoint, request)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Network(NetworkError::Timeout)),
        }
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &RequestDescriptor,
    ) -> Result<Response, FetchError> {
        let url = endpoint.url_for(request);
        let mut builder = self.client.request(request.method.clone(), &url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| e.into_fetch_error())?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        Err(FetchError::api(status.as_u16(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_default() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base, Duration::from_millis(500));
        assert_eq!(policy.cap, Duration::from_millis(8000));
        assert!((policy.factor - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delay_calculation() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(100),
            Duration::from_millis(5000),
            Duration::from_secs(1),
        );

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(150));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(225));
        // 337.5 rounds up
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(338));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            Duration::from_secs(1),
        );

        // 100 * 1.5^6 = 1139 > 1000
        assert_eq!(policy.delay_for_attempt(6), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_delays_never_decrease() {
        let policy = BackoffPolicy::default();
        let delays: Vec<_> = (0..20).map(|n| policy.delay_for_attempt(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_url_building() {
        let endpoint = Endpoint::direct("https://api.example.com/data/2.5/");
        let request = RequestDescriptor::get("/weather")
            .with_query("lat", "28.46")
            .with_query("q", "a b");

        assert_eq!(
            endpoint.url_for(&request),
            "https://api.example.com/data/2.5/weather?lat=28.46&q=a%20b"
        );
    }

    #[test]
    fn test_empty_path_uses_base() {
        let endpoint = Endpoint::direct("https://overpass.example/api/interpreter");
        let request = RequestDescriptor::post("", "[out:json];");
        assert_eq!(
            endpoint.url_for(&request),
            "https://overpass.example/api/interpreter"
        );
    }

    #[test]
    fn test_proxy_template_wraps_encoded_target() {
        let request = RequestDescriptor::get("x").with_query("k", "v");
        let templated = Endpoint::proxied("https://up.example", "https://proxy.example/?{url}");
        let prefixed = Endpoint::proxied("https://up.example", "https://proxy.example/raw?url=");

        assert_eq!(
            templated.url_for(&request),
            "https://proxy.example/?https%3A%2F%2Fup.example%2Fx%3Fk%3Dv"
        );
        assert_eq!(
            prefixed.url_for(&request),
            "https://proxy.example/raw?url=https%3A%2F%2Fup.example%2Fx%3Fk%3Dv"
        );
        assert_eq!(templated.label(), "https://up.example via https://proxy.example/");
    }

    #[test]
    fn test_dev_proxies_follow_direct_mirrors() {
        let set = EndpointSet::from_urls("overpass", ["https://a.example", "https://b.example"])
            .with_dev_proxies(&["https://proxy.example/?{url}".to_string()]);

        assert_eq!(set.len(), 3);
        assert!(!set.endpoints()[1].is_proxied());
        assert!(set.endpoints()[2].is_proxied());
        assert_eq!(set.endpoints()[2].base(), "https://a.example");
    }

    #[test]
    fn test_attempt_order_starts_at_cursor() {
        let set = EndpointSet::from_urls("s", ["a", "b", "c"]);
        assert_eq!(set.attempt_order(), vec![0, 1, 2]);

        set.mark_success(2);
        assert_eq!(set.attempt_order(), vec![2, 0, 1]);
        assert_eq!(set.current().map(Endpoint::base), Some("c"));
        // Clones share the cursor
        assert_eq!(set.clone().cursor(), 2);
    }

    #[test]
    fn test_exhausted_error_exposes_last_failure() {
        let err = RotationError::Exhausted {
            set: "s".into(),
            attempts: vec![
                AttemptRecord {
                    endpoint_index: 0,
                    endpoint: "a".into(),
                    delay_before: Duration::ZERO,
                    error: Some(FetchError::api(500, "boom")),
                },
                AttemptRecord {
                    endpoint_index: 1,
                    endpoint: "b".into(),
                    delay_before: Duration::from_millis(1),
                    error: Some(FetchError::Network(NetworkError::Timeout)),
                },
            ],
        };

        assert!(matches!(
            FetchError::from(err),
            FetchError::Network(NetworkError::Timeout)
        ));
    }
}
