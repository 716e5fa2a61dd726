use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use wayfarer_core::Config;
use wayfarer_fetch::FetchRuntime;
use wayfarer_narrative::{NarrativeContext, NarrativeFetcher, NarrativeRequest, NarrativeUpdate};
use wayfarer_places::PoiFetcher;
use wayfarer_weather::{WeatherAlertsFetcher, WeatherCondition};

/// Santa Cruz de Tenerife
const DEFAULT_LOCATION: (f64, f64) = (28.4578, -16.2637);

fn parse_location() -> Result<(f64, f64)> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => Ok(DEFAULT_LOCATION),
        [lat, lon] => Ok((
            lat.parse().with_context(|| format!("invalid latitude {:?}", lat))?,
            lon.parse().with_context(|| format!("invalid longitude {:?}", lon))?,
        )),
        _ => anyhow::bail!("usage: wayfarer [<lat> <lon>]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    wayfarer_core::init()?;

    let (lat, lon) = parse_location()?;
    let (config, _) = Config::load_validated()?;

    let cache = FetchRuntime::open_cache(&config).context("failed to open cache")?;
    let runtime = FetchRuntime::from_config(&config, Arc::new(cache))?;
    tracing::info!("Looking up {:.4}, {:.4}", lat, lon);

    let alerts_fetcher = WeatherAlertsFetcher::new(runtime.clone(), &config.weather);
    let places = PoiFetcher::new(runtime.clone(), &config.places);
    let narrative = NarrativeFetcher::new(runtime.clone(), &config.narrative);

    let (weather, alerts, pois) = tokio::join!(
        alerts_fetcher.current_weather().current(lat, lon),
        alerts_fetcher.alerts(lat, lon),
        places.nearby_default(lat, lon),
    );

    let (location, condition, temperature) = match &weather.value {
        Some(w) => {
            println!(
                "Weather ({:?}): {}, {:.1}°C, wind {:.1} m/s",
                weather.source,
                w.condition.description(),
                w.temperature,
                w.wind_speed
            );
            (
                w.place_name.clone().unwrap_or_else(|| "your location".into()),
                w.condition,
                w.temperature,
            )
        }
        None => {
            println!("Weather ({:?}): unavailable", weather.source);
            ("your location".to_string(), WeatherCondition::default(), 20.0)
        }
    };

    println!("\nAlerts ({:?}):", alerts.source);
    if alerts.value.is_empty() {
        println!("  none");
    }
    for alert in &alerts.value {
        println!("  [{}] {} - {}", alert.level.as_str(), alert.zone, alert.description);
    }

    println!("\nNearby ({:?}):", pois.source);
    for poi in pois.value.iter().take(10) {
        println!("  {} {} ({}, {:.0} m)", poi.icon, poi.name, poi.category.label(), poi.distance_m);
    }

    let context = NarrativeContext::new(location, lat, lon, condition, temperature)
        .with_alerts(&alerts.value)
        .with_pois(&pois.value);

    println!("\nNarrative:");
    let mut updates = narrative.stream(NarrativeRequest::Insight(context));
    while let Some(update) = updates.next().await {
        match update {
            NarrativeUpdate::Partial(text) => tracing::debug!("partial: {}", text),
            NarrativeUpdate::Final(result) => println!("  ({:?}) {}", result.source, result.value),
        }
    }

    Ok(())
}
