use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use wayfarer_core::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Text deltas, in order. The stream ends when the backend is done.
pub type DeltaStream = BoxStream<'static, Result<String, FetchError>>;

/// A generative text backend.
#[async_trait]
pub trait TextGenerator: Send + Sync + std::fmt::Debug {
    /// Whole completion in one response, with endpoint failover.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, FetchError>;

    /// Incremental completion from the primary endpoint.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, FetchError>;
}
