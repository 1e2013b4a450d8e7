//! Same-tab custom events
//!
//! Listeners run synchronously inside `dispatch`, in registration order,
//! the way `window.dispatchEvent` behaves.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An event delivered to same-tab listeners
#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
    pub name: String,
    pub detail: Value,
}

/// Handle used to remove a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&CustomEvent) + Send + Sync>;

/// Event target of one tab
#[derive(Default)]
pub struct LocalEvents {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, String, Listener)>>,
}

impl LocalEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: Fn(&CustomEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .push((id, name.to_string(), Arc::new(listener)));
        id
    }

    /// Returns false if the listener was already removed
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Invoke every listener registered for `name`; returns how many ran
    pub fn dispatch(&self, name: &str, detail: Value) -> usize {
        // Snapshot so listeners may add/remove listeners while running.
        let targets: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|(_, listener_name, _)| listener_name == name)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        let event = CustomEvent {
            name: name.to_string(),
            detail,
        };

        for listener in &targets {
            listener(&event);
        }

        targets.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.lock()
            .iter()
            .filter(|(_, listener_name, _)| listener_name == name)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, String, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
