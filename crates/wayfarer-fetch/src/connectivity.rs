//! Online/offline state consulted before any network I/O.
//!
//! The monitor makes no network calls. The transport layer (or the
//! platform's network-change hook) reports flips through `set_online`.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Single source of truth for connectivity. Clones share state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<Connectivity>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(Connectivity::Online)
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn is_offline(&self) -> bool {
        self.current() == Connectivity::Offline
    }

    /// Record a transport-level signal. Subscribers are notified only when
    /// the state actually changes.
    pub fn set_online(&self, online: bool) {
        let next = if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::info!("Connectivity changed: {:?}", next);
        }
    }

    /// Change notifications; `changed().await` resolves on each flip.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::online()
    }
}
