//! Unread notification counter
//!
//! One count per origin, persisted in local storage under
//! `aegis:unreadCount`. Every effective change is announced three ways:
//! - same tab: the `unread:changed` custom event
//! - other tabs: `{type: "unread:changed", value}` on the
//!   `aegis-notifications` broadcast channel
//! - other tabs: the storage event for the key
//!
//! The count is a best-effort badge. Storage failures read as 0 and are
//! never surfaced to callers.

use crate::config::{NOTIFICATIONS_CHANNEL, UNREAD_COUNT_KEY, UNREAD_EVENT};
use crate::platform::{BroadcastChannel, ListenerId, Tab};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How to derive the next count from the current one
pub enum Adjustment {
    /// Replace the count
    Set(i64),
    /// Compute the count from the previous value
    Apply(Box<dyn FnOnce(i64) -> i64 + Send>),
}

impl Adjustment {
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(i64) -> i64 + Send + 'static,
    {
        Adjustment::Apply(Box::new(f))
    }

    fn resolve(self, prev: i64) -> i64 {
        match self {
            Adjustment::Set(next) => next,
            Adjustment::Apply(f) => f(prev),
        }
    }
}

impl From<i64> for Adjustment {
    fn from(next: i64) -> Self {
        Adjustment::Set(next)
    }
}

impl fmt::Debug for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::Set(n) => f.debug_tuple("Set").field(n).finish(),
            Adjustment::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

/// Cross-tab unread counter store
#[derive(Clone)]
pub struct UnreadCounter {
    tab: Tab,
    channel: BroadcastChannel,
    // Serializes read-modify-write cycles within this process
    write_lock: Arc<Mutex<()>>,
}

impl UnreadCounter {
    pub fn new(tab: &Tab) -> Self {
        Self {
            tab: tab.clone(),
            channel: tab.broadcast_channel(NOTIFICATIONS_CHANNEL),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current count; 0 when absent or unreadable
    pub async fn get(&self) -> i64 {
        match self.tab.local_storage().get_item(UNREAD_COUNT_KEY).await {
            Ok(raw) => parse_count(raw.as_deref()),
            Err(e) => {
                tracing::warn!("Failed to read unread count, using 0: {}", e);
                0
            }
        }
    }

    /// Store `n` (negative reads as 0) if it differs from the current
    /// count. Returns whether it changed.
    pub async fn set(&self, n: i64) -> bool {
        let _guard = self.write_lock.lock().await;
        self.set_locked(n.max(0)).await
    }

    /// Apply an adjustment, clamped to 0
    pub async fn adjust(&self, adjustment: impl Into<Adjustment>) -> bool {
        let _guard = self.write_lock.lock().await;
        let prev = self.get().await;
        let next = adjustment.into().resolve(prev).max(0);
        self.set_locked(next).await
    }

    pub async fn increment(&self, delta: i64) -> bool {
        self.adjust(Adjustment::with(move |prev| prev.saturating_add(delta)))
            .await
    }

    pub async fn decrement(&self, delta: i64) -> bool {
        self.adjust(Adjustment::with(move |prev| prev.saturating_sub(delta)))
            .await
    }

    /// Call `callback` with every new count, whichever tab changed it.
    ///
    /// Must be called inside a tokio runtime: cross-tab listeners run as
    /// spawned tasks owned by the returned `Subscription`.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let mut tasks = Vec::with_capacity(2);

        let same_tab = Arc::clone(&callback);
        let listener_id = self
            .tab
            .events()
            .add_listener(UNREAD_EVENT, move |event| {
                same_tab(event.detail.as_i64().unwrap_or(0));
            });

        let mut channel_rx = self.channel.subscribe();
        let from_channel = Arc::clone(&callback);
        tasks.push(tokio::spawn(async move {
            while let Some(message) = channel_rx.recv().await {
                if let Some(n) = parse_channel_message(&message) {
                    from_channel(n);
                }
            }
        }));

        if let Some(mut storage_rx) = self.tab.local_storage().listen() {
            let from_storage = Arc::clone(&callback);
            tasks.push(tokio::spawn(async move {
                while let Some(event) = storage_rx.recv().await {
                    if event.key == UNREAD_COUNT_KEY {
                        from_storage(parse_count(event.new_value.as_deref()));
                    }
                }
            }));
        }

        Subscription {
            tab: self.tab.clone(),
            listener_id: Some(listener_id),
            tasks,
        }
    }

    async fn set_locked(&self, n: i64) -> bool {
        let prev = self.get().await;
        if prev == n {
            return false;
        }

        if let Err(e) = self
            .tab
            .local_storage()
            .set_item(UNREAD_COUNT_KEY, &n.to_string())
            .await
        {
            tracing::warn!("Failed to persist unread count {}: {}", n, e);
            return false;
        }

        tracing::debug!("Unread count changed: {} -> {}", prev, n);

        self.channel
            .post_message(json!({ "type": UNREAD_EVENT, "value": n }));
        self.tab.events().dispatch(UNREAD_EVENT, json!(n));

        true
    }
}

/// Live registration created by `UnreadCounter::subscribe`.
///
/// Dropping it has the same effect as `unsubscribe`.
pub struct Subscription {
    tab: Tab,
    listener_id: Option<ListenerId>,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.listener_id.take() {
            self.tab.events().remove_listener(id);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Parse a stored count. Non-numeric, fractional garbage or absent → 0.
fn parse_count(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

fn parse_channel_message(message: &Value) -> Option<i64> {
    if message.get("type").and_then(Value::as_str) != Some(UNREAD_EVENT) {
        return None;
    }

    let value = message.get("value")?;
    Some(
        value
            .as_i64()
            .or_else(|| value.as_str().map(|s| parse_count(Some(s))))
            .unwrap_or(0),
    )
}
