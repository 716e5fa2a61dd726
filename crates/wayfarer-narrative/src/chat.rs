//! OpenAI-style `/chat/completions` backend.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use wayfarer_core::{FetchError, NarrativeConfig, NetworkError, ReqwestErrorExt};
use wayfarer_fetch::{EndpointSet, FetchRuntime, RequestDescriptor};

use crate::generator::{ChatMessage, DeltaStream, TextGenerator};
use crate::sse::{SseDecoder, SseEvent};

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    runtime: FetchRuntime,
    endpoints: EndpointSet,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(runtime: FetchRuntime, config: &NarrativeConfig) -> Self {
        Self {
            endpoints: runtime.endpoint_set("completions", config.endpoints.clone()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            runtime,
        }
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> Result<RequestDescriptor, FetchError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": stream,
        });
        let body = serde_json::to_string(&body).map_err(|e| FetchError::Validation(e.to_string()))?;

        let mut request = RequestDescriptor::post("/chat/completions", body)
            .with_header("Content-Type", "application/json");
        if stream {
            request = request.with_header("Accept", "text/event-stream");
        }
        if let Some(key) = &self.api_key {
            request = request.with_header("Authorization", format!("Bearer {}", key));
        }
        Ok(request)
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, FetchError> {
        let request = self.request(messages, false)?;
        let outcome = self
            .runtime
            .rotation()
            .execute(&self.endpoints, &request, parse_completion)
            .await?;
        Ok(outcome.value)
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<DeltaStream, FetchError> {
        let endpoint = self
            .endpoints
            .current()
            .cloned()
            .ok_or_else(|| FetchError::Validation("no completion endpoints configured".into()))?;
        let request = self.request(messages, true)?;

        let response = self.runtime.rotation().open(&endpoint, &request).await?;
        tracing::debug!("Streaming completion from {}", endpoint.label());

        let idle_timeout = self.runtime.rotation().policy().attempt_timeout;
        Ok(sse_deltas(response.bytes_stream(), idle_timeout))
    }
}

/// `choices[0].message.content`, which must be non-blank.
pub(crate) fn parse_completion(body: &str) -> Result<String, FetchError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(format!("completion response: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| FetchError::parse("completion has no content"))
}

type SseState<B> = (
    futures::stream::BoxStream<'static, Result<B, reqwest::Error>>,
    SseDecoder,
    VecDeque<SseEvent>,
    bool,
);

/// Turn an SSE body into text deltas. Each wait for the next network chunk
/// is bounded by `idle_timeout`.
pub(crate) fn sse_deltas<S, B>(body: S, idle_timeout: Duration) -> DeltaStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state: SseState<B> = (body.boxed(), SseDecoder::new(), VecDeque::new(), false);

    futures::stream::unfold(state, move |(mut body, mut decoder, mut pending, mut finished)| async move {
        loop {
            if let Some(event) = pending.pop_front() {
                match event {
                    SseEvent::Delta(text) => {
                        return Some((Ok(text), (body, decoder, pending, finished)));
                    }
                    SseEvent::Done => return None,
                    SseEvent::Invalid(e) => {
                        let err = FetchError::parse(format!("stream chunk: {}", e));
                        return Some((Err(err), (body, decoder, VecDeque::new(), true)));
                    }
                }
            }
            if finished {
                return None;
            }

            match tokio::time::timeout(idle_timeout, body.next()).await {
                Err(_) => {
                    let err = FetchError::Network(NetworkError::Timeout);
                    return Some((Err(err), (body, decoder, pending, true)));
                }
                Ok(Some(Err(e))) => {
                    return Some((Err(e.into_fetch_error()), (body, decoder, pending, true)));
                }
                Ok(Some(Ok(bytes))) => pending.extend(decoder.push(bytes.as_ref())),
                Ok(None) => {
                    finished = true;
                    pending.extend(decoder.finish());
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send + 'static {
        let parts: Vec<Result<Vec<u8>, reqwest::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(parts)
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"  Sol y brisa.  "}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Sol y brisa.");
    }

    #[test]
    fn test_blank_completion_is_rejected() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"   "}}]}"#;
        assert!(matches!(parse_completion(body), Err(FetchError::Parse(_))));
        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
        assert!(parse_completion(r#"{"error":{"message":"quota"}}"#).is_err());
    }

    #[tokio::test]
    async fn test_sse_deltas_in_order() {
        let body = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Warm\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" evening\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" ignored\"}}]}\n\n",
        ]);
        let deltas: Vec<_> = sse_deltas(body, Duration::from_secs(1)).collect().await;
        let deltas: Vec<String> = deltas.into_iter().map(|d| d.unwrap()).collect();
        assert_eq!(deltas, vec!["Warm", " evening"]);
    }

    #[tokio::test]
    async fn test_sse_invalid_chunk_ends_stream_with_error() {
        let body = chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n", "data: nope\n"]);
        let items: Vec<_> = sse_deltas(body, Duration::from_secs(1)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(FetchError::Parse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sse_idle_timeout() {
        let body = futures::stream::pending::<Result<Vec<u8>, reqwest::Error>>();
        let items: Vec<_> = sse_deltas(body, Duration::from_secs(5)).collect().await;
        assert!(matches!(
            items.as_slice(),
            [Err(FetchError::Network(NetworkError::Timeout))]
        ));
    }
}
