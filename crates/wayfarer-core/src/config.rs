use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const AEMET_KEY_ENV: &str = "WAYFARER_AEMET_API_KEY";
const OPENWEATHER_KEY_ENV: &str = "WAYFARER_OPENWEATHER_API_KEY";
const NARRATIVE_KEY_ENV: &str = "WAYFARER_NARRATIVE_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory (also holds the cache database)
    pub config_dir: PathBuf,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub places: PlacesConfig,

    #[serde(default)]
    pub narrative: NarrativeConfig,
}

/// TTL and size bound for one cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePolicy {
    pub ttl_minutes: u64,
    pub max_items: usize,
}

impl NamespacePolicy {
    pub const fn new(ttl_minutes: u64, max_items: usize) -> Self {
        Self {
            ttl_minutes,
            max_items,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite file name, relative to `config_dir`
    pub db_file: String,

    pub ai_insights: NamespacePolicy,
    pub poi: NamespacePolicy,
    pub activities: NamespacePolicy,
    pub alerts: NamespacePolicy,
    pub weather: NamespacePolicy,

    /// Oldest entry still served while offline or throttled
    pub offline_stale_hours: u64,

    /// TTL for synthesized fallback content (capped by the namespace TTL)
    pub fallback_ttl_minutes: u64,
}

impl CacheConfig {
    pub fn offline_stale_ceiling(&self) -> Duration {
        Duration::from_secs(self.offline_stale_hours * 3600)
    }

    pub fn fallback_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_ttl_minutes * 60)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_file: "cache.sqlite3".to_string(),
            ai_insights: NamespacePolicy::new(30, 50),
            poi: NamespacePolicy::new(24 * 60, 30),
            activities: NamespacePolicy::new(60, 30),
            alerts: NamespacePolicy::new(15, 20),
            weather: NamespacePolicy::new(10, 20),
            offline_stale_hours: 72,
            fallback_ttl_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Upper bound for one endpoint attempt, headers and body included
    pub attempt_timeout_secs: u64,

    /// Backoff before the second attempt
    pub backoff_base_ms: u64,

    /// Growth per attempt (`base * factor^n`)
    pub backoff_factor: f64,

    /// Backoff ceiling
    pub backoff_cap_ms: u64,

    /// Pending requests younger than this are joined instead of re-issued
    pub dedup_window_secs: u64,

    /// Route otherwise unreachable endpoints through `cors_proxies`
    ///
    /// DEVELOPMENT ONLY. Proxies see every request, API keys included.
    #[serde(default)]
    pub dev_mode: bool,

    /// Proxy templates; `{url}` is replaced by the encoded target URL,
    /// otherwise the encoded target is appended
    #[serde(default)]
    pub cors_proxies: Vec<String>,

    pub user_agent: String,
}

impl NetworkConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 10,
            backoff_base_ms: 500,
            backoff_factor: 1.5,
            backoff_cap_ms: 8000,
            dedup_window_secs: 30,
            dev_mode: false,
            cors_proxies: vec![
                "https://corsproxy.io/?{url}".to_string(),
                "https://api.allorigins.win/raw?url={url}".to_string(),
            ],
            user_agent: "Wayfarer/0.1.0".to_string(),
        }
    }
}

/// Minimum spacing between calls per throttle bucket, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub current_weather_secs: u64,
    pub alerts_secs: u64,
    pub places_secs: u64,
    pub narrative_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            current_weather_secs: 600,
            alerts_secs: 300,
            places_secs: 2,
            narrative_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// AEMET OpenData base URL (regional alerts, Spain)
    pub aemet_base_url: String,
    pub aemet_api_key: Option<String>,

    /// OpenWeather base URL (global current weather)
    pub openweather_base_url: String,
    pub openweather_api_key: Option<String>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            aemet_base_url: "https://opendata.aemet.es/opendata".to_string(),
            aemet_api_key: None,
            openweather_base_url: "https://api.openweathermap.org".to_string(),
            openweather_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    /// Equivalent Overpass interpreters, tried in order
    pub overpass_endpoints: Vec<String>,
    pub default_radius_m: u32,
    pub max_results: usize,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            overpass_endpoints: vec![
                "https://overpass-api.de/api/interpreter".to_string(),
                "https://overpass.kumi.systems/api/interpreter".to_string(),
                "https://maps.mail.ru/osm/tools/overpass/api/interpreter".to_string(),
            ],
            default_radius_m: 5000,
            max_results: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// OpenAI-compatible base URLs (`.../v1`), tried in order
    pub endpoints: Vec<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the primary endpoint for a streamed (SSE) response
    pub stream: bool,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["https://api.openai.com/v1".to_string()],
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 160,
            temperature: 0.8,
            stream: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wayfarer");

        Self {
            config_dir,
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
            throttle: ThrottleConfig::default(),
            weather: WeatherConfig::default(),
            places: PlacesConfig::default(),
            narrative: NarrativeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating it if missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let contents =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// API keys may be supplied through the environment instead of the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(AEMET_KEY_ENV) {
            self.weather.aemet_api_key = Some(key);
        }
        if let Ok(key) = std::env::var(OPENWEATHER_KEY_ENV) {
            self.weather.openweather_api_key = Some(key);
        }
        if let Ok(key) = std::env::var(NARRATIVE_KEY_ENV) {
            self.narrative.api_key = Some(key);
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.config_dir.join(&self.cache.db_file)
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        validate_url(
            &self.weather.aemet_base_url,
            "weather.aemet_base_url",
            &mut result,
        );
        validate_url(
            &self.weather.openweather_base_url,
            "weather.openweather_base_url",
            &mut result,
        );

        if self.places.overpass_endpoints.is_empty() {
            result.add_error(
                "places.overpass_endpoints",
                "At least one Overpass endpoint is required",
            );
        }
        for (i, endpoint) in self.places.overpass_endpoints.iter().enumerate() {
            validate_url(
                endpoint,
                &format!("places.overpass_endpoints[{}]", i),
                &mut result,
            );
        }
        if self.places.max_results == 0 {
            result.add_error("places.max_results", "Must be greater than 0");
        }

        if self.narrative.endpoints.is_empty() {
            result.add_warning(
                "narrative.endpoints",
                "No narrative endpoints - only template text will be shown",
            );
        }
        for (i, endpoint) in self.narrative.endpoints.iter().enumerate() {
            validate_url(endpoint, &format!("narrative.endpoints[{}]", i), &mut result);
        }

        if self.network.backoff_base_ms > self.network.backoff_cap_ms {
            result.add_error(
                "network.backoff_base_ms",
                "Backoff base must not exceed backoff cap",
            );
        }
        if !(self.network.backoff_factor >= 1.0) {
            result.add_error("network.backoff_factor", "Backoff factor must be >= 1.0");
        }
        if self.network.attempt_timeout_secs == 0 {
            result.add_error(
                "network.attempt_timeout_secs",
                "Attempt timeout must be greater than 0",
            );
        }
        if self.network.dedup_window_secs == 0 {
            result.add_warning(
                "network.dedup_window_secs",
                "Request deduplication disabled (0 seconds)",
            );
        }
        if self.network.dev_mode {
            for (i, proxy) in self.network.cors_proxies.iter().enumerate() {
                let sample = proxy.replace("{url}", "https%3A%2F%2Fexample.com");
                validate_url(&sample, &format!("network.cors_proxies[{}]", i), &mut result);
            }
        }

        for (field, policy) in [
            ("cache.ai_insights", &self.cache.ai_insights),
            ("cache.poi", &self.cache.poi),
            ("cache.activities", &self.cache.activities),
            ("cache.alerts", &self.cache.alerts),
            ("cache.weather", &self.cache.weather),
        ] {
            if policy.max_items == 0 {
                result.add_error(field, "max_items must be greater than 0");
            }
            if policy.ttl_minutes == 0 {
                result.add_warning(field, "TTL of 0 minutes disables caching");
            }
        }

        if self.weather.aemet_api_key.is_none() {
            result.add_warning(
                "weather.aemet_api_key",
                "AEMET key not configured - regional alerts unavailable",
            );
        }
        if self.weather.openweather_api_key.is_none() {
            result.add_warning(
                "weather.openweather_api_key",
                "OpenWeather key not configured - current conditions unavailable",
            );
        }

        result
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("wayfarer");

        Ok(config_dir.join("config.toml"))
    }
}

fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }
            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
