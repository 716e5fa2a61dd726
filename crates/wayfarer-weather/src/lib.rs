//! Weather for Wayfarer
//!
//! Regional warnings from AEMET OpenData, with OpenWeather current
//! conditions as the coarse substitute outside AEMET coverage or when AEMET
//! reports nothing.

pub mod aemet;
pub mod fetcher;
pub mod heuristics;
pub mod openweather;
pub mod region;
pub mod types;

pub use aemet::AemetClient;
pub use fetcher::{AlertsResult, WeatherAlertsFetcher};
pub use heuristics::alert_from_conditions;
pub use openweather::{CurrentResult, CurrentWeatherClient};
pub use region::aemet_area;
pub use types::*;
