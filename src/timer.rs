//! Timer registry: keyed repeating timers with bulk teardown.
//!
//! An explicit registry object replaces any process-global timer list: every
//! timer a session starts is registered here, and `stop_all` tears the whole
//! set down when the session ends. Timers drive async callbacks on a tokio
//! interval; stopping a timer prevents future firings but never interrupts a
//! callback already in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};
use tokio::task::JoinHandle;

new_key_type! {
    /// Identifies a timer slot inside a [`TimerRegistry`].
    pub struct TimerId;
}

// ---------------------------------------------------------------------------
// TimerConfig
// ---------------------------------------------------------------------------

/// Firing schedule for a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Delay before the first firing and between subsequent firings.
    pub interval: Duration,
    /// Whether the timer keeps firing after the first time.
    pub repeats: bool,
}

impl TimerConfig {
    /// A repeating timer with the given interval.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            repeats: true,
        }
    }

    /// A one-shot timer firing once after the given delay.
    pub fn once(delay: Duration) -> Self {
        Self {
            interval: delay,
            repeats: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TimerRegistry
// ---------------------------------------------------------------------------

/// Owns every active timer for one scope (typically a table session).
///
/// Cloning produces another handle to the same registry.
#[derive(Clone)]
pub struct TimerRegistry {
    timers: Arc<Mutex<SlotMap<TimerId, JoinHandle<()>>>>,
}

impl TimerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(SlotMap::with_key())),
        }
    }

    /// Register and start a timer driving `callback` on `config`'s schedule.
    ///
    /// The first firing happens after one full interval, not immediately.
    /// Callback invocations never overlap: the next interval starts counting
    /// only after the callback's future completes.
    pub fn register<F, Fut>(&self, config: TimerConfig, mut callback: F) -> TimerId
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(config.interval).await;
                callback().await;
                if !config.repeats {
                    break;
                }
            }
        });
        self.timers.lock().insert(handle)
    }

    /// Stop a timer. Returns false for unknown (or already stopped) ids.
    pub fn stop(&self, id: TimerId) -> bool {
        match self.timers.lock().remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stop every registered timer.
    pub fn stop_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut timers = self.timers.lock();
            let ids: Vec<TimerId> = timers.keys().collect();
            ids.into_iter().filter_map(|id| timers.remove(id)).collect()
        };
        for handle in handles {
            handle.abort();
        }
    }

    /// Number of registered timers (stopped ones are removed eagerly,
    /// finished one-shots linger until `stop` or `stop_all`).
    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    /// Whether no timers are registered.
    pub fn is_empty(&self) -> bool {
        self.timers.lock().is_empty()
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
