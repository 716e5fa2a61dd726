//! At most one in-flight operation per request fingerprint.
//!
//! The table check and the registration happen under one lock with no await
//! in between. The operation runs in its own task, so callers that stop
//! listening never cancel work other joiners (or the cache) still need. A
//! drop guard inside that task removes the registration however the
//! operation ends, panics included.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

/// Observed validity window for joining a pending request.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DedupError {
    #[error("Shared operation for {0} did not complete")]
    Aborted(String),
}

/// Handle every joiner of one fingerprint awaits.
pub type PendingResult<T> = Shared<BoxFuture<'static, Result<T, DedupError>>>;

struct PendingRequest<T> {
    id: u64,
    started_at: Instant,
    result: PendingResult<T>,
}

type PendingTable<T> = Arc<Mutex<HashMap<String, PendingRequest<T>>>>;

#[derive(Clone)]
pub struct RequestDeduplicator<T> {
    window: Duration,
    pending: PendingTable<T>,
    next_id: Arc<AtomicU64>,
}

impl<T> std::fmt::Debug for RequestDeduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("window", &self.window)
            .field("in_flight", &self.pending.lock().len())
            .finish()
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Join the pending request for `fingerprint`, or start `operation`.
    ///
    /// Registration happens when this is called, not when the returned
    /// future is first polled. A pending request older than the window is
    /// not joined; the new operation replaces it in the table.
    pub fn join_or_start<F, Fut>(&self, fingerprint: &str, operation: F) -> PendingResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut pending = self.pending.lock();

        if let Some(existing) = pending.get(fingerprint) {
            if existing.started_at.elapsed() < self.window {
                tracing::debug!("Joining in-flight request {}", fingerprint);
                return existing.result.clone();
            }
            tracing::debug!(
                "In-flight request {} is older than {:?}; starting a fresh one",
                fingerprint,
                self.window
            );
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            pending: Arc::clone(&self.pending),
            fingerprint: fingerprint.to_string(),
            id,
        };

        let work = operation();
        let handle = tokio::spawn(async move {
            let _registration = registration;
            work.await
        });

        let label = fingerprint.to_string();
        let result = async move {
            handle.await.map_err(|e| {
                tracing::warn!("Shared operation for {} failed to complete: {}", label, e);
                DedupError::Aborted(label)
            })
        }
        .boxed()
        .shared();

        pending.insert(
            fingerprint.to_string(),
            PendingRequest {
                id,
                started_at: Instant::now(),
                result: result.clone(),
            },
        );
        result
    }

    pub fn is_pending(&self, fingerprint: &str) -> bool {
        self.pending.lock().contains_key(fingerprint)
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Removes its own table entry on drop, unless a newer request replaced it.
struct Registration<T> {
    pending: PendingTable<T>,
    fingerprint: String,
    id: u64,
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if pending.get(&self.fingerprint).map(|p| p.id) == Some(self.id) {
            pending.remove(&self.fingerprint);
        }
    }
}
