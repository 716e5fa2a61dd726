//! Narrative text for Wayfarer
//!
//! Short generated lines about the current situation, streamed from an
//! OpenAI-compatible backend when possible and synthesized from templates
//! otherwise.

pub mod chat;
pub mod context;
pub mod fetcher;
pub mod generator;
pub mod sse;
pub mod templates;

pub use chat::ChatCompletionsClient;
pub use context::{NarrativeContext, NarrativeRequest};
pub use fetcher::{NarrativeFetcher, NarrativeResult, NarrativeStream, NarrativeUpdate};
pub use generator::{ChatMessage, DeltaStream, Role, TextGenerator};
pub use templates::{synthesize, ConditionBucket};
