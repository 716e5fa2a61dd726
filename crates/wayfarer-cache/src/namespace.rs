use std::time::Duration;

use serde::{Deserialize, Serialize};
use wayfarer_core::{CacheConfig, NamespacePolicy};

/// Logical partition of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Namespace {
    AiInsights,
    Poi,
    Activities,
    Alerts,
    Weather,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::AiInsights,
        Namespace::Poi,
        Namespace::Activities,
        Namespace::Alerts,
        Namespace::Weather,
    ];

    /// Stored form of the namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiInsights => "AI_INSIGHTS",
            Self::Poi => "POI",
            Self::Activities => "ACTIVITIES",
            Self::Alerts => "ALERTS",
            Self::Weather => "WEATHER",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-namespace TTL and item bound, resolved from config.
#[derive(Debug, Clone)]
pub struct NamespacePolicies {
    ai_insights: NamespacePolicy,
    poi: NamespacePolicy,
    activities: NamespacePolicy,
    alerts: NamespacePolicy,
    weather: NamespacePolicy,
}

impl NamespacePolicies {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            ai_insights: config.ai_insights,
            poi: config.poi,
            activities: config.activities,
            alerts: config.alerts,
            weather: config.weather,
        }
    }

    pub fn policy(&self, namespace: Namespace) -> NamespacePolicy {
        match namespace {
            Namespace::AiInsights => self.ai_insights,
            Namespace::Poi => self.poi,
            Namespace::Activities => self.activities,
            Namespace::Alerts => self.alerts,
            Namespace::Weather => self.weather,
        }
    }

    pub fn ttl(&self, namespace: Namespace) -> Duration {
        self.policy(namespace).ttl()
    }

    pub fn max_items(&self, namespace: Namespace) -> usize {
        self.policy(namespace).max_items
    }

    pub fn with_max_items(mut self, namespace: Namespace, max_items: usize) -> Self {
        let slot = match namespace {
            Namespace::AiInsights => &mut self.ai_insights,
            Namespace::Poi => &mut self.poi,
            Namespace::Activities => &mut self.activities,
            Namespace::Alerts => &mut self.alerts,
            Namespace::Weather => &mut self.weather,
        };
        slot.max_items = max_items;
        self
    }
}

impl Default for NamespacePolicies {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
