//! Storage areas and storage events
//!
//! A `StorageArea` is one tab's handle on a key-value store. Areas opened on
//! the origin's shared store announce every effective change to the other
//! tabs; the writing tab never hears its own writes.

use super::kv_store::{KeyValueStore, MemoryStore};
use crate::error::Result;
use crate::platform::TabId;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Change notification for a shared storage key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed
    pub new_value: Option<String>,
    pub source: TabId,
}

/// A tab's view of a key-value store
#[derive(Clone)]
pub struct StorageArea {
    tab_id: TabId,
    backend: Arc<dyn KeyValueStore>,
    events: Option<broadcast::Sender<StorageEvent>>,
}

impl StorageArea {
    /// Private, non-announcing area backed by memory
    pub fn session(tab_id: TabId) -> Self {
        Self {
            tab_id,
            backend: Arc::new(MemoryStore::new()),
            events: None,
        }
    }

    /// Area on a store shared with other tabs
    pub(crate) fn shared(
        tab_id: TabId,
        backend: Arc<dyn KeyValueStore>,
        events: broadcast::Sender<StorageEvent>,
    ) -> Self {
        Self {
            tab_id,
            backend,
            events: Some(events),
        }
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.backend.get_item(key).await
    }

    pub async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let old_value = match self.events {
            Some(_) => self.backend.get_item(key).await?,
            None => None,
        };

        self.backend.set_item(key, value).await?;

        if old_value.as_deref() != Some(value) {
            self.announce(key, old_value, Some(value.to_string()));
        }

        Ok(())
    }

    pub async fn remove_item(&self, key: &str) -> Result<()> {
        let old_value = match self.events {
            Some(_) => self.backend.get_item(key).await?,
            None => None,
        };

        self.backend.remove_item(key).await?;

        if old_value.is_some() {
            self.announce(key, old_value, None);
        }

        Ok(())
    }

    /// Listen for changes made by other tabs. `None` for session areas.
    pub fn listen(&self) -> Option<StorageListener> {
        self.events.as_ref().map(|tx| StorageListener {
            rx: tx.subscribe(),
            tab_id: self.tab_id,
        })
    }

    fn announce(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        if let Some(tx) = &self.events {
            let event = StorageEvent {
                key: key.to_string(),
                old_value,
                new_value,
                source: self.tab_id,
            };
            // No receivers is fine: nobody is listening yet.
            let _ = tx.send(event);
        }
    }
}

/// Receiver of storage events written by other tabs
pub struct StorageListener {
    rx: broadcast::Receiver<StorageEvent>,
    tab_id: TabId,
}

impl StorageListener {
    /// Next foreign event, or `None` once the origin is gone
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.tab_id => continue,
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Storage listener lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
