//! Stream: a reactive data cell with serialized, order-preserving updates.
//!
//! A [`Stream`] owns one value and a registry of named subscriber callbacks.
//! Every mutation goes through a capacity-1, zero-delay
//! [`BatchQueue`](crate::queue::BatchQueue): one update fully completes,
//! including all subscriber callbacks, before the next begins, even when
//! callers enqueue updates re-entrantly. Subscribers are awaited sequentially
//! in registration order and must not assume concurrency.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::queue::{BatchFuture, BatchQueue, BatchQueueConfig};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque error produced by a subscriber callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by a subscriber callback.
pub type CallbackFuture = Pin<Box<dyn Future<Output = Result<(), CallbackError>> + Send>>;

/// A subscriber callback, invoked with `(old, new)` snapshots.
pub type UpdateCallback<T> = Arc<dyn Fn(T, T) -> CallbackFuture + Send + Sync>;

type Reducer<T> = Box<dyn FnOnce(T) -> T + Send>;

/// Options accepted by the update family of methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOpts {
    /// Apply the update without invoking subscriber callbacks.
    pub suppress_change_trigger: bool,
}

impl UpdateOpts {
    /// Options that skip subscriber callbacks.
    pub fn suppressed() -> Self {
        Self {
            suppress_change_trigger: true,
        }
    }
}

/// Registration options for [`Stream::register_update_callback`].
#[derive(Debug, Clone)]
pub struct RegisterOpts {
    /// Identifier for the callback. Registering the same id twice overwrites
    /// the earlier callback unless `overwrite_existing` is false.
    pub callback_id: String,
    /// When false and the id is already registered, the new callback is
    /// silently dropped (first registrant wins).
    pub overwrite_existing: bool,
}

impl RegisterOpts {
    /// Options for the given id with overwrite enabled.
    pub fn id(callback_id: impl Into<String>) -> Self {
        Self {
            callback_id: callback_id.into(),
            overwrite_existing: true,
        }
    }

    /// Keep an existing registration for this id instead of overwriting it
    /// (builder).
    pub fn keep_existing(mut self) -> Self {
        self.overwrite_existing = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

struct Subscriber<T: 'static> {
    id: String,
    callback: UpdateCallback<T>,
}

struct UpdateJob<T: 'static> {
    reducer: Reducer<T>,
    suppress: bool,
}

struct StreamInner<T: 'static> {
    data: Mutex<T>,
    /// Insertion order is invocation order.
    subscribers: Mutex<Vec<Subscriber<T>>>,
    write_queue: BatchQueue<UpdateJob<T>>,
}

/// A reactive data cell. Cloning produces another handle to the same cell.
pub struct Stream<T: 'static> {
    inner: Arc<StreamInner<T>>,
}

impl<T: 'static> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Stream<T> {
    /// Create a stream holding `initial`.
    pub fn new(initial: T) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<StreamInner<T>>| {
            let weak = weak.clone();
            // Capacity 1, zero delay: the queue is pure serialization here.
            // Reducer jobs are never equal, so nothing is deduplicated.
            let write_queue = BatchQueue::new(
                BatchQueueConfig::new(move |mut batch: Vec<UpdateJob<T>>| {
                    let weak = weak.clone();
                    async move {
                        let Some(inner) = weak.upgrade() else {
                            return Ok(());
                        };
                        // max_per_batch is 1; drain defensively anyway.
                        for job in batch.drain(..) {
                            StreamInner::apply(&inner, job).await?;
                        }
                        Ok(())
                    }
                })
                .with_interval(Duration::ZERO)
                .with_max_per_batch(1),
            );
            StreamInner {
                data: Mutex::new(initial),
                subscribers: Mutex::new(Vec::new()),
                write_queue,
            }
        });
        Self { inner }
    }

    /// Clone out the current snapshot. Always a fully-applied value; partial
    /// states are never observable.
    pub fn get(&self) -> T {
        self.inner.data.lock().clone()
    }

    /// Read the current snapshot by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.data.lock())
    }

    /// Enqueue a reducer. The reducer receives the already-applied result of
    /// every earlier enqueued update, never a stale snapshot. Completion is
    /// observable via [`flush`](Stream::flush).
    pub fn update(&self, reducer: impl FnOnce(T) -> T + Send + 'static) {
        self.update_with_opts(reducer, UpdateOpts::default());
    }

    /// [`update`](Stream::update) with explicit options.
    pub fn update_with_opts(
        &self,
        reducer: impl FnOnce(T) -> T + Send + 'static,
        opts: UpdateOpts,
    ) {
        self.inner.write_queue.push([UpdateJob {
            reducer: Box::new(reducer),
            suppress: opts.suppress_change_trigger,
        }]);
    }

    /// Apply a reducer immediately, bypassing the write queue. Only safe when
    /// no concurrent update is in flight; intended for tests and
    /// bootstrapping.
    pub async fn update_sync(
        &self,
        reducer: impl FnOnce(T) -> T + Send + 'static,
        opts: UpdateOpts,
    ) -> Result<(), CallbackError> {
        StreamInner::apply(
            &self.inner,
            UpdateJob {
                reducer: Box::new(reducer),
                suppress: opts.suppress_change_trigger,
            },
        )
        .await
    }

    /// Replace the value.
    pub fn set(&self, data: T) {
        self.update(move |_| data);
    }

    /// Replace the value with explicit options.
    pub fn set_with_opts(&self, data: T, opts: UpdateOpts) {
        self.update_with_opts(move |_| data, opts);
    }

    /// Re-invoke every subscriber with `(data, data)` without changing the
    /// value. Forces dependents to re-evaluate.
    pub async fn trigger_change(&self) -> Result<(), CallbackError> {
        let snapshot = self.get();
        StreamInner::notify(&self.inner, snapshot.clone(), snapshot).await
    }

    /// Register a subscriber callback under `opts.callback_id`.
    ///
    /// Returns a handle whose `remove` unregisters the callback. With
    /// `overwrite_existing: false` and an already-registered id, the new
    /// callback is dropped and the returned handle is inert.
    pub fn register_update_callback<F, Fut>(&self, opts: RegisterOpts, callback: F) -> CallbackHandle<T>
    where
        F: Fn(T, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        let callback: UpdateCallback<T> = Arc::new(move |old, new| {
            let fut: CallbackFuture = Box::pin(callback(old, new));
            fut
        });
        let mut subscribers = self.inner.subscribers.lock();
        let registered = match subscribers.iter_mut().find(|s| s.id == opts.callback_id) {
            Some(existing) if opts.overwrite_existing => {
                // Overwrite in place: the callback keeps its original
                // position in the invocation order.
                existing.callback = callback;
                true
            }
            Some(_) => false,
            None => {
                subscribers.push(Subscriber {
                    id: opts.callback_id.clone(),
                    callback,
                });
                true
            }
        };
        CallbackHandle {
            stream: Arc::downgrade(&self.inner),
            id: opts.callback_id,
            registered,
        }
    }

    /// Unregister the callback with the given id. No-op for unknown ids.
    pub fn unregister_update_callback(&self, callback_id: &str) {
        self.inner
            .subscribers
            .lock()
            .retain(|s| s.id != callback_id);
    }

    /// Number of registered subscriber callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Resolve once every enqueued update (and its subscriber callbacks) has
    /// completed.
    pub async fn flush(&self) {
        self.inner.write_queue.flush().await;
    }
}

impl<T: Clone + Send + 'static> StreamInner<T> {
    /// Apply one update: snapshot, reduce, replace, then notify.
    ///
    /// The value is replaced before any subscriber runs, so a failing
    /// subscriber leaves the update applied but skips the subscribers after
    /// it. The error propagates to the write queue's caller or sink.
    async fn apply(inner: &Arc<Self>, job: UpdateJob<T>) -> Result<(), CallbackError> {
        let old = inner.data.lock().clone();
        let new = (job.reducer)(old.clone());
        *inner.data.lock() = new.clone();
        if job.suppress {
            return Ok(());
        }
        Self::notify(inner, old, new).await
    }

    async fn notify(inner: &Arc<Self>, old: T, new: T) -> Result<(), CallbackError> {
        // Snapshot the callback list so registration during notification
        // neither deadlocks nor affects this round.
        let callbacks: Vec<UpdateCallback<T>> = inner
            .subscribers
            .lock()
            .iter()
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(old.clone(), new.clone()).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CallbackHandle
// ---------------------------------------------------------------------------

/// Handle returned by [`Stream::register_update_callback`].
pub struct CallbackHandle<T: 'static> {
    stream: Weak<StreamInner<T>>,
    id: String,
    registered: bool,
}

impl<T: 'static> CallbackHandle<T> {
    /// The callback id this handle refers to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the registration actually took effect (false when a
    /// `keep_existing` registration lost to an earlier one).
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Unregister the callback. Inert handles and dropped streams no-op.
    pub fn remove(&self) {
        if !self.registered {
            return;
        }
        if let Some(inner) = self.stream.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
