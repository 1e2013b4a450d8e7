//! Named cross-tab broadcast channels
//!
//! Messages are JSON values. A message posted by a tab reaches every other
//! tab's receivers on the same channel name, never the poster itself.

use super::TabId;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone)]
pub(crate) struct ChannelEnvelope {
    source: TabId,
    data: Value,
}

/// A tab's membership in a named channel
#[derive(Clone)]
pub struct BroadcastChannel {
    name: String,
    tab_id: TabId,
    tx: broadcast::Sender<ChannelEnvelope>,
}

impl BroadcastChannel {
    pub(crate) fn new(name: &str, tab_id: TabId, tx: broadcast::Sender<ChannelEnvelope>) -> Self {
        Self {
            name: name.to_string(),
            tab_id,
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post to the other tabs. Returns the number of receivers reached,
    /// including this tab's own (which discard the message).
    pub fn post_message(&self, data: Value) -> usize {
        let envelope = ChannelEnvelope {
            source: self.tab_id,
            data,
        };

        match self.tx.send(envelope) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("[Broadcast] No receivers on channel {}", self.name);
                0
            }
        }
    }

    pub fn subscribe(&self) -> ChannelReceiver {
        ChannelReceiver {
            name: self.name.clone(),
            tab_id: self.tab_id,
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving end of a channel membership
pub struct ChannelReceiver {
    name: String,
    tab_id: TabId,
    rx: broadcast::Receiver<ChannelEnvelope>,
}

impl ChannelReceiver {
    /// Next message from another tab, or `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.source == self.tab_id => continue,
                Ok(envelope) => return Some(envelope.data),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "[Broadcast] Receiver on {} lagged, skipped {} messages",
                        self.name,
                        skipped
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
