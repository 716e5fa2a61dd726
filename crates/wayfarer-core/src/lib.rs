pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, Config, NamespacePolicy, NarrativeConfig, NetworkConfig, PlacesConfig,
    ThrottleConfig, ValidationResult, WeatherConfig,
};
pub use error::{FetchError, NetworkError, ReqwestErrorExt};

use anyhow::Result;

/// Initialize logging for the application.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Wayfarer core initialized");
    Ok(())
}
