//! Coarse alerts derived from current conditions.
//!
//! Used when the regional warning service has nothing for a point. Rules are
//! checked in priority order and at most one alert is produced.

use crate::types::{AlertLevel, AlertSource, CurrentWeather, WeatherAlert};

const TORNADO: i32 = 781;
const EXTREME_HEAT_C: f64 = 44.0;
const HIGH_HEAT_C: f64 = 40.0;
const HEAVY_SNOW: [i32; 2] = [602, 622];
const HEAVY_RAIN: [i32; 4] = [502, 503, 504, 522];
/// Roughly 61 km/h sustained
const STRONG_WIND_MS: f64 = 17.0;

struct Rule {
    phenomenon: &'static str,
    level: AlertLevel,
    description: String,
}

fn first_matching_rule(weather: &CurrentWeather) -> Option<Rule> {
    let code = weather.condition_code;

    if code == TORNADO {
        return Some(Rule {
            phenomenon: "tornado",
            level: AlertLevel::Red,
            description: "Tornado reported nearby".into(),
        });
    }
    if weather.temperature >= HIGH_HEAT_C {
        let level = if weather.temperature >= EXTREME_HEAT_C {
            AlertLevel::Red
        } else {
            AlertLevel::Orange
        };
        return Some(Rule {
            phenomenon: "heat",
            level,
            description: format!("Extreme heat: {:.0}°C", weather.temperature),
        });
    }
    if (200..=232).contains(&code) {
        return Some(Rule {
            phenomenon: "thunderstorm",
            level: AlertLevel::Orange,
            description: "Thunderstorms in the area".into(),
        });
    }
    if HEAVY_SNOW.contains(&code) {
        return Some(Rule {
            phenomenon: "snow",
            level: AlertLevel::Orange,
            description: "Heavy snowfall".into(),
        });
    }
    if HEAVY_RAIN.contains(&code) {
        return Some(Rule {
            phenomenon: "rain",
            level: AlertLevel::Yellow,
            description: "Heavy rain".into(),
        });
    }
    if weather.wind_speed > STRONG_WIND_MS {
        return Some(Rule {
            phenomenon: "wind",
            level: AlertLevel::Yellow,
            description: format!("Strong wind: {:.0} km/h", weather.wind_speed * 3.6),
        });
    }
    None
}

/// At most one alert for the observed conditions.
pub fn alert_from_conditions(weather: &CurrentWeather, location_key: &str) -> Option<WeatherAlert> {
    let rule = first_matching_rule(weather)?;
    Some(WeatherAlert {
        source: AlertSource::OpenWeather,
        id: format!("owm:{}:{}", rule.phenomenon, location_key),
        zone: weather
            .place_name
            .clone()
            .unwrap_or_else(|| location_key.to_string()),
        province: None,
        description: rule.description,
        level: rule.level,
        start_time: Some(weather.observed_at),
        end_time: None,
        phenomenon: rule.phenomenon.to_string(),
    })
}
