//! The fetch runtime: one explicitly constructed context for all fetchers.
//!
//! Owned by the application root and cloned into each domain fetcher. It
//! holds the shared HTTP client, cache, connectivity state, throttle and
//! rotation engine, so no fetcher keeps hidden module-level state.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use wayfarer_cache::{CacheError, CacheStore, Namespace, NamespacePolicies};
use wayfarer_core::{Config, FetchError, ReqwestErrorExt};

use crate::connectivity::ConnectivityMonitor;
use crate::dedup::RequestDeduplicator;
use crate::rotation::{BackoffPolicy, EndpointRotation, EndpointSet};
use crate::throttle::ApiThrottle;

#[derive(Debug, Clone)]
pub struct FetchRuntime {
    inner: Arc<RuntimeInner>,
}

#[derive(Debug)]
struct RuntimeInner {
    cache: Arc<CacheStore>,
    connectivity: ConnectivityMonitor,
    throttle: ApiThrottle,
    rotation: EndpointRotation,
    dev_proxies: Vec<String>,
    dedup_window: Duration,
    fallback_ttl: Duration,
}

impl FetchRuntime {
    /// Build the runtime around an already opened cache.
    pub fn from_config(config: &Config, cache: Arc<CacheStore>) -> Result<Self, FetchError> {
        Self::with_connectivity(config, cache, ConnectivityMonitor::online())
    }

    pub fn with_connectivity(
        config: &Config,
        cache: Arc<CacheStore>,
        connectivity: ConnectivityMonitor,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(config.network.user_agent.clone())
            .build()
            .map_err(|e| e.into_fetch_error())?;

        let dev_proxies = if config.network.dev_mode {
            tracing::warn!(
                "Dev mode: {} CORS proxies will front unreachable endpoints",
                config.network.cors_proxies.len()
            );
            config.network.cors_proxies.clone()
        } else {
            Vec::new()
        };

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                cache,
                throttle: ApiThrottle::new(&config.throttle, connectivity.clone()),
                connectivity,
                rotation: EndpointRotation::new(http, BackoffPolicy::from_config(&config.network)),
                dev_proxies,
                dedup_window: config.network.dedup_window(),
                fallback_ttl: config.cache.fallback_ttl(),
            }),
        })
    }

    /// Open the on-disk cache named by the config.
    ///
    /// Falls back to an in-memory cache when the file cannot be opened, so a
    /// broken disk only costs persistence.
    pub fn open_cache(config: &Config) -> Result<CacheStore, CacheError> {
        let policies = NamespacePolicies::from_config(&config.cache);
        let retention = config.cache.offline_stale_ceiling();
        let path = config.cache_path();

        match CacheStore::open(&path, policies.clone()) {
            Ok(store) => Ok(store.with_retention(retention)),
            Err(e) => {
                tracing::warn!(
                    "Failed to open cache at {}: {}; using in-memory cache",
                    path.display(),
                    e
                );
                Ok(CacheStore::in_memory(policies)?.with_retention(retention))
            }
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    pub fn throttle(&self) -> &ApiThrottle {
        &self.inner.throttle
    }

    pub fn rotation(&self) -> &EndpointRotation {
        &self.inner.rotation
    }

    pub fn http(&self) -> &Client {
        self.inner.rotation.client()
    }

    pub fn is_offline(&self) -> bool {
        self.inner.connectivity.is_offline()
    }

    /// Endpoint set for `urls`, fronted by the dev proxies when enabled.
    pub fn endpoint_set<I, S>(&self, name: &str, urls: I) -> EndpointSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EndpointSet::from_urls(name, urls).with_dev_proxies(&self.inner.dev_proxies)
    }

    pub fn deduplicator<T>(&self) -> RequestDeduplicator<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        RequestDeduplicator::new(self.inner.dedup_window)
    }

    pub fn ttl(&self, namespace: Namespace) -> Duration {
        self.inner.cache.ttl(namespace)
    }

    /// TTL for synthesized content: short enough to retry live data soon.
    pub fn fallback_ttl(&self, namespace: Namespace) -> Duration {
        self.ttl(namespace).min(self.inner.fallback_ttl)
    }
}
