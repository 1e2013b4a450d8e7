//! Browser-platform primitives
//!
//! This module models the pieces of the browser platform the client
//! synchronizes through:
//! - `Origin`: everything same-origin tabs share (persistent storage,
//!   storage events, broadcast channels)
//! - `Tab`: one browsing context with its own id, storage areas and
//!   same-tab event target
//! - `BroadcastChannel`: named cross-tab message passing
//! - `LocalEvents`: synchronous same-tab custom events

pub mod broadcast;
pub mod events;

pub use broadcast::{BroadcastChannel, ChannelReceiver};
pub use events::{CustomEvent, ListenerId, LocalEvents};

use crate::config::{CHANNEL_CAPACITY, STORAGE_EVENT_CAPACITY};
use crate::storage::{KeyValueStore, MemoryStore, StorageArea, StorageEvent};
use broadcast::ChannelEnvelope;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast as tokio_broadcast;
use uuid::Uuid;

/// Identity of one tab within an origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State shared by all tabs of one origin
#[derive(Clone)]
pub struct Origin {
    inner: Arc<OriginInner>,
}

struct OriginInner {
    local_store: Arc<dyn KeyValueStore>,
    storage_events: tokio_broadcast::Sender<StorageEvent>,
    channels: Mutex<HashMap<String, tokio_broadcast::Sender<ChannelEnvelope>>>,
}

impl Origin {
    /// Create an origin whose local storage lives in `local_store`
    pub fn new(local_store: Arc<dyn KeyValueStore>) -> Self {
        let (storage_events, _) = tokio_broadcast::channel(STORAGE_EVENT_CAPACITY);

        Self {
            inner: Arc::new(OriginInner {
                local_store,
                storage_events,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Origin with non-persistent local storage
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Open a new tab on this origin
    pub fn open_tab(&self) -> Tab {
        let id = TabId::new();
        tracing::debug!("Opening tab {}", id);

        Tab {
            inner: Arc::new(TabInner {
                id,
                origin: self.clone(),
                local: StorageArea::shared(
                    id,
                    Arc::clone(&self.inner.local_store),
                    self.inner.storage_events.clone(),
                ),
                session: StorageArea::session(id),
                events: LocalEvents::new(),
            }),
        }
    }

    /// Sender for the named channel, created on first use
    fn channel(&self, name: &str) -> tokio_broadcast::Sender<ChannelEnvelope> {
        let mut channels = self
            .inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        channels
            .entry(name.to_string())
            .or_insert_with(|| tokio_broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// One browsing context
#[derive(Clone)]
pub struct Tab {
    inner: Arc<TabInner>,
}

struct TabInner {
    id: TabId,
    origin: Origin,
    local: StorageArea,
    session: StorageArea,
    events: LocalEvents,
}

impl Tab {
    pub fn id(&self) -> TabId {
        self.inner.id
    }

    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    /// Origin-wide persistent storage
    pub fn local_storage(&self) -> &StorageArea {
        &self.inner.local
    }

    /// Storage private to this tab
    pub fn session_storage(&self) -> &StorageArea {
        &self.inner.session
    }

    /// Same-tab event target
    pub fn events(&self) -> &LocalEvents {
        &self.inner.events
    }

    /// Join the named broadcast channel
    pub fn broadcast_channel(&self, name: &str) -> BroadcastChannel {
        BroadcastChannel::new(name, self.inner.id, self.inner.origin.channel(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tabs_share_local_storage() {
        let origin = Origin::in_memory();
        let a = origin.open_tab();
        let b = origin.open_tab();

        assert_ne!(a.id(), b.id());

        a.local_storage().set_item("theme", "dark").await.unwrap();
        assert_eq!(
            b.local_storage().get_item("theme").await.unwrap().as_deref(),
            Some("dark")
        );
    }
}
