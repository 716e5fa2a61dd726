use wayfarer_cache::Namespace;
use wayfarer_core::FetchError;
use wayfarer_fetch::Fingerprint;
use wayfarer_places::Poi;
use wayfarer_weather::{WeatherAlert, WeatherCondition};

use crate::generator::ChatMessage;

/// At most this many POI names go into a prompt or cache key.
pub const MAX_CONTEXT_POIS: usize = 5;

const SYSTEM_PROMPT: &str = "You are a warm, concise travel companion. \
Answer in at most two short sentences of plain prose, without lists or markdown.";

/// Structured situation a narrative is written about.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeContext {
    pub location: String,
    pub lat: f64,
    pub lon: f64,
    pub condition: WeatherCondition,
    pub temperature_c: f64,
    /// Short alert labels, e.g. `orange thunderstorm`
    pub alerts: Vec<String>,
    /// Names of nearby places
    pub pois: Vec<String>,
}

impl NarrativeContext {
    pub fn new(
        location: impl Into<String>,
        lat: f64,
        lon: f64,
        condition: WeatherCondition,
        temperature_c: f64,
    ) -> Self {
        Self {
            location: location.into(),
            lat,
            lon,
            condition,
            temperature_c,
            alerts: Vec::new(),
            pois: Vec::new(),
        }
    }

    pub fn with_alerts(mut self, alerts: &[WeatherAlert]) -> Self {
        self.alerts = alerts
            .iter()
            .map(|a| format!("{} {}", a.level.as_str(), a.phenomenon))
            .collect();
        self
    }

    pub fn with_pois(mut self, pois: &[Poi]) -> Self {
        self.pois = pois
            .iter()
            .take(MAX_CONTEXT_POIS)
            .map(|p| p.name.clone())
            .collect();
        self
    }

    /// Temperature as it is spoken and keyed: whole degrees.
    pub fn rounded_temperature(&self) -> i64 {
        self.temperature_c.round() as i64
    }

    fn describe(&self) -> String {
        let mut text = format!(
            "Location: {}. Weather: {}, {}°C.",
            self.location,
            self.condition.description().to_lowercase(),
            self.rounded_temperature()
        );
        if !self.alerts.is_empty() {
            text.push_str(&format!(" Active alerts: {}.", self.alerts.join(", ")));
        }
        if !self.pois.is_empty() {
            text.push_str(&format!(" Nearby: {}.", self.pois.join(", ")));
        }
        text
    }
}

/// What kind of text to generate.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrativeRequest {
    /// A short mood line about the current situation
    Insight(NarrativeContext),
    /// A suggestion of what to do given the situation
    Activities(NarrativeContext),
    /// Free-form question
    Prompt(String),
}

impl NarrativeRequest {
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Activities(_) => Namespace::Activities,
            Self::Insight(_) | Self::Prompt(_) => Namespace::AiInsights,
        }
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        match self {
            Self::Insight(ctx) | Self::Activities(ctx) => {
                wayfarer_fetch::check_coordinates(ctx.lat, ctx.lon)?;
                if !ctx.temperature_c.is_finite() {
                    return Err(FetchError::Validation("temperature is not finite".into()));
                }
                Ok(())
            }
            Self::Prompt(text) if text.trim().is_empty() => {
                Err(FetchError::Validation("empty prompt".into()))
            }
            Self::Prompt(_) => Ok(()),
        }
    }

    /// Cache and dedup key. Equal situations share a key regardless of
    /// list order or sub-kilometre coordinate noise.
    pub fn fingerprint(&self) -> String {
        match self {
            Self::Insight(ctx) => context_fingerprint("insight", ctx),
            Self::Activities(ctx) => context_fingerprint("activities", ctx),
            Self::Prompt(text) => Fingerprint::new("prompt").part(normalize_prompt(text)).build(),
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        let user = match self {
            Self::Insight(ctx) => format!(
                "{} Write one evocative line about how it feels to be here right now.",
                ctx.describe()
            ),
            Self::Activities(ctx) => format!(
                "{} Suggest what to do in the next few hours, naming a nearby place if it fits.",
                ctx.describe()
            ),
            Self::Prompt(text) => text.trim().to_string(),
        };
        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
    }
}

fn context_fingerprint(kind: &str, ctx: &NarrativeContext) -> String {
    Fingerprint::new(kind)
        .coords(ctx.lat, ctx.lon)
        .part(ctx.condition.description().to_lowercase().replace(' ', "_"))
        .part(ctx.rounded_temperature())
        .set(ctx.alerts.iter())
        .set(ctx.pois.iter())
        .build()
}

fn normalize_prompt(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
