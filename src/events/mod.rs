//! In-process event bus.
//!
//! Minimal named-handler registry, independent of the transfer machinery and
//! scoped to one adapter instance (no module-level globals). Handlers for a
//! name run synchronously, in registration order; the bus does not catch
//! handler panics.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registration; the same closure registered twice gets two
/// ids, and removing one leaves the other in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `name`. Duplicates are allowed.
    pub fn on<F>(&self, name: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .expect("event bus lock poisoned")
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove the registration with the given id. No-op if absent.
    pub fn off(&self, name: &str, id: HandlerId) {
        let mut handlers = self.handlers.lock().expect("event bus lock poisoned");
        if let Some(list) = handlers.get_mut(name) {
            if let Some(pos) = list.iter().position(|(hid, _)| *hid == id) {
                list.remove(pos);
            }
        }
    }

    /// Invoke every handler registered for `name`, in registration order.
    pub fn emit(&self, name: &str, value: &Value) {
        // Snapshot under the lock so a handler may re-enter the bus.
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().expect("event bus lock poisoned");
            match handlers.get(name) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in snapshot {
            handler(value);
        }
    }
}
