//! Lifecycle registrations and their teardown.
//!
//! A session owns exactly five fixed lifecycle keys. Each started key maps to
//! the cleanup resources that undo it; `stop_all` is the session's full
//! teardown. Stopping never interrupts in-flight work, it only prevents
//! future scheduling.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::timer::{TimerId, TimerRegistry};

/// The fixed set of per-session lifecycle registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKey {
    /// Repeating timer watching the external stream's dirty flag.
    ExternalPoller,
    /// Subscription on the session payload that requests renders.
    PayloadSubscription,
    /// Repeating timer reading persisted state back from the store.
    PersistedStatePoller,
    /// Subscription writing state changes out to the store.
    PersistedStateSync,
    /// Batch queue warming host caches (icons and the like).
    Preload,
}

/// A resource to release when a lifecycle key stops.
pub(crate) enum Cleanup {
    /// Stop a registry timer.
    Timer(TimerId),
    /// Arbitrary teardown: unregister a stream callback, pause a queue.
    Run(Box<dyn FnOnce() + Send>),
}

#[derive(Default)]
pub(crate) struct LifecycleRegistry {
    entries: Mutex<HashMap<LifecycleKey, Vec<Cleanup>>>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a started key. Restarting a key releases the previous
    /// resources first.
    pub fn start(&self, key: LifecycleKey, cleanups: Vec<Cleanup>, timers: &TimerRegistry) {
        let previous = self.entries.lock().insert(key, cleanups);
        if let Some(previous) = previous {
            release(previous, timers);
        }
    }

    pub fn is_started(&self, key: LifecycleKey) -> bool {
        self.entries.lock().contains_key(&key)
    }

    /// Stop one key. Unknown keys no-op.
    pub fn stop(&self, key: LifecycleKey, timers: &TimerRegistry) {
        if let Some(cleanups) = self.entries.lock().remove(&key) {
            release(cleanups, timers);
        }
    }

    /// Stop every started key.
    pub fn stop_all(&self, timers: &TimerRegistry) {
        let drained: Vec<Vec<Cleanup>> = self.entries.lock().drain().map(|(_, v)| v).collect();
        for cleanups in drained {
            release(cleanups, timers);
        }
    }
}

fn release(cleanups: Vec<Cleanup>, timers: &TimerRegistry) {
    for cleanup in cleanups {
        match cleanup {
            Cleanup::Timer(id) => {
                timers.stop(id);
            }
            Cleanup::Run(f) => f(),
        }
    }
}
