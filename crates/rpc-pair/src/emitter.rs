//! A small local event emitter: listeners registered by event name, removable
//! by an opaque token rather than by closure identity (Rust closures, unlike
//! JS functions, have no stable identity to compare for an `off(event, fn)`).

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Token returned by `on`/`once`, passed back to `off` to remove a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;
type AnyListener = Arc<dyn Fn(&str, &[Value]) + Send + Sync>;

struct Entry {
    id: ListenerId,
    listener: Listener,
    once: Arc<AtomicBool>,
}

struct AnyEntry {
    id: ListenerId,
    listener: AnyListener,
}

#[derive(Default)]
pub struct Emitter {
    listeners: Mutex<HashMap<String, Vec<Entry>>>,
    any_listeners: Mutex<Vec<AnyEntry>>,
    next_id: AtomicU64,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn on(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.alloc_id();
        self.listeners
            .lock()
            .entry(event.into())
            .or_default()
            .push(Entry {
                id,
                listener: Arc::new(listener),
                once: Arc::new(AtomicBool::new(false)),
            });
        id
    }

    pub fn once(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.alloc_id();
        self.listeners
            .lock()
            .entry(event.into())
            .or_default()
            .push(Entry {
                id,
                listener: Arc::new(listener),
                once: Arc::new(AtomicBool::new(true)),
            });
        id
    }

    /// Removes a single listener registered under `event`. A no-op if the
    /// token does not match any currently registered listener.
    pub fn off(&self, event: &str, id: ListenerId) {
        let mut listeners = self.listeners.lock();
        if let Some(entries) = listeners.get_mut(event) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                listeners.remove(event);
            }
        }
    }

    /// Removes every listener registered under `event`, mirroring
    /// `removeListener(event)` called with no specific function.
    pub fn remove_all(&self, event: &str) {
        self.listeners.lock().remove(event);
    }

    /// Subscribes to every emit regardless of event name, receiving the
    /// event name alongside its data. This is the wildcard tap the actor
    /// registry uses to proxy an actor's own publishes onto its shared
    /// `actorEvents` channel without swapping out the actor's publish
    /// function — the registry is just one more listener.
    pub fn on_any(&self, listener: impl Fn(&str, &[Value]) + Send + Sync + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.any_listeners.lock().push(AnyEntry {
            id,
            listener: Arc::new(listener),
        });
        id
    }

    pub fn off_any(&self, id: ListenerId) {
        self.any_listeners.lock().retain(|e| e.id != id);
    }

    /// Invokes every listener registered for `event`, sweeping out any
    /// marked `once` after they fire, then invokes every wildcard listener.
    pub fn emit(&self, event: &str, data: &[Value]) {
        let snapshot: Vec<(ListenerId, Listener, Arc<AtomicBool>)> = {
            let listeners = self.listeners.lock();
            match listeners.get(event) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (e.id, e.listener.clone(), e.once.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut fired_once = Vec::new();
        for (id, listener, once) in snapshot {
            listener(data);
            if once.load(Ordering::Relaxed) {
                fired_once.push(id);
            }
        }

        if !fired_once.is_empty() {
            let mut listeners = self.listeners.lock();
            if let Some(entries) = listeners.get_mut(event) {
                entries.retain(|e| !fired_once.contains(&e.id));
                if entries.is_empty() {
                    listeners.remove(event);
                }
            }
        }

        let any_snapshot: Vec<AnyListener> = self
            .any_listeners
            .lock()
            .iter()
            .map(|e| e.listener.clone())
            .collect();
        for listener in any_snapshot {
            listener(event, data);
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .get(event)
            .map(|e| e.len())
            .unwrap_or(0)
    }
}
