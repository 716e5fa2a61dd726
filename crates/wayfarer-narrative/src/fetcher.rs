use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use wayfarer_core::{FetchError, NarrativeConfig};
use wayfarer_fetch::{FetchRuntime, RequestDeduplicator, Resolved, ThrottleBucket};

use crate::chat::ChatCompletionsClient;
use crate::context::NarrativeRequest;
use crate::generator::{ChatMessage, TextGenerator};
use crate::templates::synthesize;

pub type NarrativeResult = Resolved<String>;

/// Pending updates a slow consumer may fall behind by. Partial text
/// beyond this is skipped; the final result always arrives.
const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum NarrativeUpdate {
    /// Text generated so far; each value extends the previous one
    Partial(String),
    /// The resolved narrative, identical to what was cached
    Final(NarrativeResult),
}

/// Incremental delivery of one narrative. Dropping it stops delivery but
/// not the generation, whose result is still cached.
#[derive(Debug)]
pub struct NarrativeStream {
    inner: ReceiverStream<NarrativeUpdate>,
}

impl NarrativeStream {
    /// Drain the stream and return the final result.
    pub async fn final_result(mut self) -> Option<NarrativeResult> {
        while let Some(update) = self.next().await {
            if let NarrativeUpdate::Final(result) = update {
                return Some(result);
            }
        }
        None
    }
}

impl Stream for NarrativeStream {
    type Item = NarrativeUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[derive(Debug, Clone)]
pub struct NarrativeFetcher {
    runtime: FetchRuntime,
    generator: Arc<dyn TextGenerator>,
    dedup: RequestDeduplicator<NarrativeResult>,
    streaming: bool,
}

impl NarrativeFetcher {
    pub fn new(runtime: FetchRuntime, config: &NarrativeConfig) -> Self {
        let generator = Arc::new(ChatCompletionsClient::new(runtime.clone(), config));
        Self::with_generator(runtime, generator, config.stream)
    }

    pub fn with_generator(
        runtime: FetchRuntime,
        generator: Arc<dyn TextGenerator>,
        streaming: bool,
    ) -> Self {
        Self {
            dedup: runtime.deduplicator(),
            runtime,
            generator,
            streaming,
        }
    }

    /// Resolve a narrative. Never fails; see the `source` for provenance.
    pub async fn fetch(&self, request: NarrativeRequest) -> NarrativeResult {
        self.run(request, None).await
    }

    /// Resolve a narrative, delivering partial text as it is generated.
    ///
    /// Must be called within a Tokio runtime. Only the caller that starts
    /// the generation sees partial text; callers joining an identical
    /// in-flight request, or served from cache, get the final result only.
    pub fn stream(&self, request: NarrativeRequest) -> NarrativeStream {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let this = self.clone();

        tokio::spawn(async move {
            let result = this.run(request, Some(tx.clone())).await;
            if tx.send(NarrativeUpdate::Final(result)).await.is_err() {
                tracing::debug!("Narrative consumer went away before the final result");
            }
        });

        NarrativeStream {
            inner: ReceiverStream::new(rx),
        }
    }

    async fn run(
        &self,
        request: NarrativeRequest,
        updates: Option<mpsc::Sender<NarrativeUpdate>>,
    ) -> NarrativeResult {
        if let Err(e) = request.validate() {
            tracing::debug!("Skipping narrative: {}", e);
            return Resolved::unavailable(String::new());
        }

        let namespace = request.namespace();
        let key = request.fingerprint();
        if let Some(text) = self.runtime.cache().get::<String>(namespace, &key) {
            tracing::debug!("Narrative cache hit for {}", key);
            return Resolved::cached(text);
        }

        let this = self.clone();
        let shared_request = request.clone();
        let fingerprint = key.clone();
        let pending = self.dedup.join_or_start(&key, move || async move {
            this.resolve(shared_request, &fingerprint, updates).await
        });

        pending.await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Resolved::fallback(synthesize(&request))
        })
    }

    async fn resolve(
        &self,
        request: NarrativeRequest,
        key: &str,
        updates: Option<mpsc::Sender<NarrativeUpdate>>,
    ) -> NarrativeResult {
        let namespace = request.namespace();

        // Stored by a generation that completed after the caller's cache check
        if let Some(text) = self.runtime.cache().get::<String>(namespace, key) {
            return Resolved::cached(text);
        }
        if self.runtime.is_offline() {
            tracing::debug!("Offline; narrative for {} from store or templates", key);
            return self.stale_or_synthesized(&request, key);
        }
        if !self.runtime.throttle().can_call(ThrottleBucket::Narrative) {
            tracing::debug!("Narrative throttled for {}", key);
            return self.stale_or_synthesized(&request, key);
        }
        self.runtime.throttle().record_call(ThrottleBucket::Narrative);

        let messages = request.messages();
        let mut generated = None;

        if self.streaming {
            match self.stream_text(&messages, updates.as_ref()).await {
                Ok(text) => generated = Some(text),
                Err(e) => tracing::debug!("Streamed narrative failed for {}: {}", key, e),
            }
        }
        if generated.is_none() {
            match self.generator.complete(&messages).await {
                Ok(text) if !text.trim().is_empty() => generated = Some(text.trim().to_string()),
                Ok(_) => tracing::warn!("Narrative backend returned no text for {}", key),
                Err(e) => tracing::warn!("Narrative backend failed for {}: {}", key, e),
            }
        }

        let cache = self.runtime.cache();
        match generated {
            Some(text) => {
                tracing::info!("Generated narrative for {}", key);
                cache.set(namespace, key, &text, self.runtime.ttl(namespace));
                Resolved::live(text)
            }
            None => {
                let text = synthesize(&request);
                cache.set(namespace, key, &text, self.runtime.fallback_ttl(namespace));
                Resolved::fallback(text)
            }
        }
    }

    /// Accumulate a streamed completion, forwarding cumulative text.
    /// A stream that breaks off midway is a failure.
    async fn stream_text(
        &self,
        messages: &[ChatMessage],
        updates: Option<&mpsc::Sender<NarrativeUpdate>>,
    ) -> Result<String, FetchError> {
        let mut deltas = self.generator.stream(messages).await?;
        let mut text = String::new();
        let mut delivered = 0;
        let mut updates = updates;

        while let Some(delta) = deltas.next().await {
            text.push_str(&delta?);
            let current = text.trim();
            if current.len() <= delivered {
                continue;
            }
            if let Some(tx) = updates {
                match tx.try_send(NarrativeUpdate::Partial(current.to_string())) {
                    Ok(()) => delivered = current.len(),
                    Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => updates = None,
                }
            }
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(FetchError::parse("streamed completion had no text"));
        }
        Ok(text)
    }

    fn stale_or_synthesized(&self, request: &NarrativeRequest, key: &str) -> NarrativeResult {
        match self
            .runtime
            .cache()
            .get_stale::<String>(request.namespace(), key)
        {
            Some(text) => Resolved::stale(text),
            None => Resolved::fallback(synthesize(request)),
        }
    }
}
