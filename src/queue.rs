//! BatchQueue: a deduplicating, throttled batch-processing queue.
//!
//! Entities pushed onto the queue are handed to a caller-supplied batch
//! operation in slices of at most `max_per_batch`, with `interval` between
//! consecutive batches. Duplicates (per a caller-supplied equality function)
//! are dropped at push time. The queue is the scheduling primitive under
//! [`Stream`](crate::stream::Stream) write serialization and is also used to
//! coalesce bursty background work such as asset preloading.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque error produced by a batch operation.
pub type BatchError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by a batch operation.
pub type BatchFuture = Pin<Box<dyn Future<Output = Result<(), BatchError>> + Send>>;

/// The caller-supplied function invoked with each deduplicated batch.
pub type BatchOperation<T> = Box<dyn Fn(Vec<T>) -> BatchFuture + Send + Sync>;

/// Equality function used to drop duplicate pushes.
pub type EqualityFn<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Sink receiving errors from fire-and-forget runs (pushes, scheduled
/// follow-ups). The default sink logs the error.
pub type ErrorSink = Box<dyn Fn(&QueueError) + Send + Sync>;

/// Errors surfaced by [`BatchQueue::run`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// `run` was called while a batch was already in flight. This is a
    /// programmer-error guard, not a recoverable condition.
    #[error("batch queue is already running")]
    AlreadyRunning,
    /// The batch operation itself failed.
    #[error("batch operation failed: {0}")]
    Batch(#[source] BatchError),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for a [`BatchQueue`].
pub struct BatchQueueConfig<T: 'static> {
    operation: BatchOperation<T>,
    interval: Duration,
    max_per_batch: Option<usize>,
    is_equal: Option<EqualityFn<T>>,
    error_sink: Option<ErrorSink>,
}

impl<T: 'static> BatchQueueConfig<T> {
    /// Create a config around the batch operation.
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BatchError>> + Send + 'static,
    {
        Self {
            operation: Box::new(move |batch| {
                let fut: BatchFuture = Box::pin(operation(batch));
                fut
            }),
            interval: Duration::ZERO,
            max_per_batch: None,
            is_equal: None,
            error_sink: None,
        }
    }

    /// Delay between consecutive batches (builder).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Maximum number of items handed to one batch operation invocation
    /// (builder). Unset means "all queued items".
    pub fn with_max_per_batch(mut self, max: usize) -> Self {
        self.max_per_batch = Some(max);
        self
    }

    /// Equality function used to drop duplicate pushes (builder). Without
    /// one, every pushed item is kept.
    pub fn with_is_equal(
        mut self,
        is_equal: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_equal = Some(Box::new(is_equal));
        self
    }

    /// Sink for errors from fire-and-forget runs (builder).
    pub fn with_error_sink(mut self, sink: impl Fn(&QueueError) + Send + Sync + 'static) -> Self {
        self.error_sink = Some(Box::new(sink));
        self
    }
}

// ---------------------------------------------------------------------------
// BatchQueue
// ---------------------------------------------------------------------------

struct QueueState<T> {
    queue: VecDeque<T>,
    running: bool,
    paused: bool,
    /// A follow-up task has been spawned and has not yet begun (or declined)
    /// its run. Tracked so `flush` can tell "idle" from "about to run".
    scheduled: bool,
}

struct Inner<T: 'static> {
    state: Mutex<QueueState<T>>,
    operation: BatchOperation<T>,
    is_equal: Option<EqualityFn<T>>,
    error_sink: ErrorSink,
    interval: Duration,
    max_per_batch: Option<usize>,
    /// Notified on every settle transition; `flush` waits on it.
    settled: Notify,
}

/// A deduplicating, throttled batch-processing queue.
///
/// Cloning produces another handle to the same queue.
///
/// # Examples
///
/// ```ignore
/// let queue = BatchQueue::new(
///     BatchQueueConfig::new(|batch: Vec<String>| async move {
///         preload(batch).await
///     })
///     .with_interval(Duration::from_millis(200))
///     .with_max_per_batch(2)
///     .with_is_equal(|a, b| a == b),
/// );
/// queue.push(["a".into(), "b".into(), "c".into()]);
/// queue.flush().await;
/// ```
pub struct BatchQueue<T: 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: 'static> Clone for BatchQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> BatchQueue<T> {
    /// Create a new queue from a config. The queue starts empty and idle.
    pub fn new(config: BatchQueueConfig<T>) -> Self {
        Self::with_initial(config, Vec::new())
    }

    /// Create a new queue seeded with initial items. Processing starts on the
    /// first `push`, `run`, or `resume`.
    pub fn with_initial(config: BatchQueueConfig<T>, initial: Vec<T>) -> Self {
        let error_sink = config.error_sink.unwrap_or_else(|| {
            Box::new(|err: &QueueError| {
                tracing::error!(error = %err, "unobserved batch queue failure");
            })
        });
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    queue: initial.into(),
                    running: false,
                    paused: false,
                    scheduled: false,
                }),
                operation: config.operation,
                is_equal: config.is_equal,
                error_sink,
                interval: config.interval,
                max_per_batch: config.max_per_batch,
                settled: Notify::new(),
            }),
        }
    }

    /// Append items not already queued (per the equality function) and, if
    /// the queue is idle and not paused, start processing.
    ///
    /// Processing happens on a spawned task; its errors go to the error sink.
    /// Callers that need completion guarantees should `await` [`flush`].
    ///
    /// [`flush`]: BatchQueue::flush
    pub fn push(&self, items: impl IntoIterator<Item = T>) {
        let should_schedule = {
            let mut state = self.inner.state.lock();
            for item in items {
                let duplicate = match &self.inner.is_equal {
                    Some(eq) => state.queue.iter().any(|existing| eq(existing, &item)),
                    None => false,
                };
                if !duplicate {
                    state.queue.push_back(item);
                }
            }
            let idle = !state.running && !state.scheduled && !state.paused;
            if idle && !state.queue.is_empty() {
                state.scheduled = true;
                true
            } else {
                false
            }
        };
        if should_schedule {
            Inner::schedule(&self.inner, Duration::ZERO);
        }
    }

    /// Process one batch now.
    ///
    /// Returns `Err(QueueError::AlreadyRunning)` if a batch is in flight. If
    /// the queue is paused or empty this is a no-op. A failing batch
    /// operation still releases the running flag and schedules the follow-up
    /// for any remaining items before the error is returned.
    pub async fn run(&self) -> Result<(), QueueError> {
        Inner::run(&self.inner).await
    }

    /// Prevent future scheduled runs from starting. A batch already in
    /// flight completes.
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
    }

    /// Undo [`pause`](BatchQueue::pause) and re-arm processing if the queue
    /// is non-empty.
    pub fn resume(&self) {
        let should_schedule = {
            let mut state = self.inner.state.lock();
            state.paused = false;
            if !state.queue.is_empty() && !state.running && !state.scheduled {
                state.scheduled = true;
                true
            } else {
                false
            }
        };
        if should_schedule {
            Inner::schedule(&self.inner, Duration::ZERO);
        }
    }

    /// Resolve once nothing is running, nothing is scheduled, and the queue
    /// is empty. On a paused queue with items this waits until `resume`.
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a settle between the check and the
            // await cannot be missed.
            notified.as_mut().enable();
            {
                let state = self.inner.state.lock();
                if state.queue.is_empty() && !state.running && !state.scheduled {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Number of queued (not yet processed) items.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().queue.is_empty()
    }

    /// Whether a batch is currently in flight.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Whether the queue is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }
}

impl<T: Send + 'static> Inner<T> {
    /// Spawn a follow-up that runs after `delay`. The `scheduled` flag must
    /// already be set by the caller.
    fn schedule(inner: &Arc<Self>, delay: Duration) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            {
                let mut state = inner.state.lock();
                state.scheduled = false;
                if state.paused || state.running || state.queue.is_empty() {
                    inner.settled.notify_waiters();
                    return;
                }
            }
            if let Err(err) = Inner::run(&inner).await {
                (inner.error_sink)(&err);
            }
        });
    }

    async fn run(inner: &Arc<Self>) -> Result<(), QueueError> {
        let batch = {
            let mut state = inner.state.lock();
            if state.running {
                return Err(QueueError::AlreadyRunning);
            }
            if state.paused || state.queue.is_empty() {
                return Ok(());
            }
            state.running = true;
            let take = inner
                .max_per_batch
                .unwrap_or(state.queue.len())
                .min(state.queue.len());
            state.queue.drain(..take).collect::<Vec<_>>()
        };

        let result = (inner.operation)(batch).await;

        // Settle: reschedule the remainder first, then release the flag, so
        // a failing batch never strands queued items.
        {
            let mut state = inner.state.lock();
            state.running = false;
            if !state.queue.is_empty() && !state.paused && !state.scheduled {
                state.scheduled = true;
                Inner::schedule(inner, inner.interval);
            }
        }
        inner.settled.notify_waiters();

        result.map_err(QueueError::Batch)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
