//! Offline narrative text.
//!
//! The bucket is a pure function of the weather condition; only the
//! template inside the bucket is picked at random.

use rand::seq::SliceRandom;
use rand::Rng;
use wayfarer_weather::WeatherCondition;

use crate::context::{NarrativeContext, NarrativeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionBucket {
    Sunny,
    Cloudy,
    Rainy,
    Stormy,
    Snowy,
    Foggy,
    Windy,
}

impl ConditionBucket {
    pub fn for_condition(condition: WeatherCondition) -> Self {
        match condition {
            WeatherCondition::Clear => Self::Sunny,
            WeatherCondition::PartlyCloudy | WeatherCondition::Cloudy => Self::Cloudy,
            WeatherCondition::Drizzle | WeatherCondition::Rain | WeatherCondition::HeavyRain => {
                Self::Rainy
            }
            WeatherCondition::Thunderstorm => Self::Stormy,
            WeatherCondition::Snow | WeatherCondition::Sleet => Self::Snowy,
            WeatherCondition::Fog => Self::Foggy,
            WeatherCondition::Windy => Self::Windy,
        }
    }

    pub fn insight_templates(&self) -> &'static [&'static str] {
        match self {
            Self::Sunny => &[
                "Bright skies over {location} at {temp}°C, the kind of light that makes every street look like a postcard.",
                "{location} is basking at {temp}°C; shade is a luxury and the sea breeze a gift.",
                "Clear and {temp}°C in {location}, a day that asks you to stay outside a little longer.",
            ],
            Self::Cloudy => &[
                "A soft grey lid over {location} at {temp}°C keeps the light gentle and the walking easy.",
                "Clouds drift above {location} at {temp}°C, muting the colours without dimming the mood.",
                "{location} sits under a calm, overcast sky at {temp}°C, good weather for wandering.",
            ],
            Self::Rainy => &[
                "Rain taps on the rooftops of {location} at {temp}°C; the cafés are at their coziest.",
                "{location} glistens under the rain at {temp}°C, every stone street freshly polished.",
                "A wet {temp}°C in {location}, the kind of day that rewards a good umbrella and a slow pace.",
            ],
            Self::Stormy => &[
                "Thunder rolls over {location} at {temp}°C; this is a moment to watch the sky from indoors.",
                "Storm clouds crowd {location} at {temp}°C, dramatic to watch and wise to avoid.",
                "{location} is under an electric sky at {temp}°C, stay close to shelter for now.",
            ],
            Self::Snowy => &[
                "Snow hushes {location} at {temp}°C, turning familiar corners into something new.",
                "{location} wears white today at {temp}°C; warm layers and warmer drinks are in order.",
                "Flakes settle over {location} at {temp}°C, the world slowed to a quiet crunch.",
            ],
            Self::Foggy => &[
                "Fog wraps {location} at {temp}°C, hiding the horizon and sharpening the details close by.",
                "{location} is half-drawn in mist at {temp}°C, a mysterious, muffled sort of day.",
                "A veil of fog lies over {location} at {temp}°C; landmarks appear one at a time.",
            ],
            Self::Windy => &[
                "The wind has the run of {location} at {temp}°C, hold on to your hat and enjoy the energy.",
                "Gusts sweep through {location} at {temp}°C, clearing the air and rattling the palms.",
                "{location} is breezy and restless at {temp}°C, a day that feels like it is on the move.",
            ],
        }
    }

    pub fn activity_templates(&self) -> &'static [&'static str] {
        match self {
            Self::Sunny => &[
                "With {temp}°C and sunshine in {location}, head for {poi} and finish with something cold by the water.",
                "Sun and {temp}°C: a fine time for a stroll to {poi} in {location}, with a stop for shade and ice cream.",
            ],
            Self::Cloudy => &[
                "Mild and grey at {temp}°C, {location} is perfect for walking to {poi} without chasing shade.",
                "Use the soft light over {location} for photos around {poi}, then find a terrace for coffee.",
            ],
            Self::Rainy => &[
                "At {temp}°C and raining in {location}, pick an indoor stop like {poi} and linger over lunch.",
                "Rain in {location} calls for a museum or market; {poi} is a good place to start.",
            ],
            Self::Stormy => &[
                "With storms over {location}, stay indoors for now and plan a visit to {poi} once the sky clears.",
                "Thunder in {location}: a long lunch inside beats any outdoor plan, save {poi} for later.",
            ],
            Self::Snowy => &[
                "Bundle up for {temp}°C in {location}; a short walk to {poi} and a hot drink after is plenty.",
                "Snow in {location} makes {poi} feel special, go early and take it slow on the paths.",
            ],
            Self::Foggy => &[
                "In the fog over {location}, stick to close-up sights such as {poi} and leave the viewpoints for later.",
                "Misty {temp}°C in {location}: wander the streets near {poi} and let the details surprise you.",
            ],
            Self::Windy => &[
                "With a strong breeze in {location}, sheltered spots like {poi} make the best stop today.",
                "Windy {temp}°C in {location}: skip the exposed coast and explore around {poi} instead.",
            ],
        }
    }
}

const PROMPT_TEMPLATES: &[&str] = &[
    "The guide is offline for a moment. Try asking again shortly, or explore what is closest to you.",
    "No answer could be prepared right now. The places nearby are a good place to begin while we reconnect.",
    "Your question is saved for when the connection returns; in the meantime, a short walk never disappoints.",
];

/// Candidate templates for a request, before placeholders are filled.
pub fn templates_for(request: &NarrativeRequest) -> &'static [&'static str] {
    match request {
        NarrativeRequest::Insight(ctx) => {
            ConditionBucket::for_condition(ctx.condition).insight_templates()
        }
        NarrativeRequest::Activities(ctx) => {
            ConditionBucket::for_condition(ctx.condition).activity_templates()
        }
        NarrativeRequest::Prompt(_) => PROMPT_TEMPLATES,
    }
}

/// Fill the placeholders of one template.
pub fn render(template: &str, request: &NarrativeRequest) -> String {
    match request {
        NarrativeRequest::Insight(ctx) | NarrativeRequest::Activities(ctx) => {
            let mut text = fill(template, ctx);
            if let Some(alert) = ctx.alerts.first() {
                text.push_str(&format!(" Keep an eye on the {} alert.", alert));
            }
            text
        }
        NarrativeRequest::Prompt(_) => template.to_string(),
    }
}

fn fill(template: &str, ctx: &NarrativeContext) -> String {
    let location = if ctx.location.trim().is_empty() {
        "Here"
    } else {
        ctx.location.trim()
    };
    let poi = ctx
        .pois
        .first()
        .map(String::as_str)
        .unwrap_or("the streets nearby");

    template
        .replace("{location}", location)
        .replace("{temp}", &ctx.rounded_temperature().to_string())
        .replace("{poi}", poi)
}

pub fn synthesize_with<R: Rng + ?Sized>(request: &NarrativeRequest, rng: &mut R) -> String {
    let candidates = templates_for(request);
    let template = candidates.choose(rng).copied().unwrap_or_default();
    render(template, request)
}

pub fn synthesize(request: &NarrativeRequest) -> String {
    synthesize_with(request, &mut rand::thread_rng())
}
