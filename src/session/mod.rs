//! Table session: the render loop around a host table widget.
//!
//! A [`TableSession`] owns one payload [`Stream`] (state + props + external
//! change counter), a timer registry, and the five lifecycle registrations.
//! It invokes the user's row provider, memoizes by snapshot identity, diffs
//! row sets, commits to the host widget, and suspends `present` callers until
//! the widget is dismissed.
//!
//! - [`payload`] — payload, render input, render generation
//! - [`rows`] — provider output, normalization, diffing
//! - [`lifecycle`] — lifecycle keys and teardown

pub mod lifecycle;
pub mod payload;
pub mod rows;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::host::{HostError, KeyValueStore, TableWidget};
use crate::queue::{BatchError, BatchFuture, BatchOperation, BatchQueue, BatchQueueConfig};
use crate::stream::{CallbackError, RegisterOpts, Stream, UpdateOpts};
use crate::timer::{TimerConfig, TimerRegistry};

use lifecycle::{Cleanup, LifecycleKey, LifecycleRegistry};
use payload::{RenderGeneration, RenderInput, SessionPayload};
use rows::{compile_rows, normalize, rows_need_rebuild};

pub use rows::{RenderNode, TableRow};

// ---------------------------------------------------------------------------
// Callback types
// ---------------------------------------------------------------------------

/// Opaque error produced by user hooks, loaders, and row providers.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by a hook.
pub type HookFuture = Pin<Box<dyn Future<Output = Result<(), HookError>> + Send>>;

/// A lifecycle hook.
pub type Hook = Box<dyn Fn() -> HookFuture + Send + Sync>;

/// Snapshot handed to the row provider.
#[derive(Debug)]
pub struct RenderContext<S, P> {
    pub state: Option<Arc<S>>,
    pub props: Option<Arc<P>>,
}

/// The user's declarative row provider.
pub type RowProvider<S, P> =
    Box<dyn Fn(RenderContext<S, P>) -> Result<Vec<RenderNode>, HookError> + Send + Sync>;

/// Async loader for initial props.
pub type PropsLoader<P> =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<P, HookError>> + Send>> + Send + Sync>;

fn boxed_hook<F, Fut>(f: F) -> Hook
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    Box::new(move || {
        let fut: HookFuture = Box::pin(f());
        fut
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by a table session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("hook `{hook}` failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: HookError,
    },
    #[error("row provider failed: {0}")]
    RowProvider(#[source] HookError),
    #[error("props loading failed: {0}")]
    PropsLoad(#[source] HookError),
    #[error("persisted state codec failed: {0}")]
    StateCodec(#[source] HookError),
    #[error("payload update failed: {0}")]
    Payload(#[source] CallbackError),
    #[error(transparent)]
    Host(#[from] HostError),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Options applied when presenting and rendering. Changing them invalidates
/// render memoization.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOpts {
    pub fullscreen: bool,
}

impl RenderOpts {
    pub fn fullscreen() -> Self {
        Self { fullscreen: true }
    }
}

/// Lifecycle hooks. Every hook is optional; hooks run in the render loop and
/// their errors surface like render errors.
#[derive(Default)]
pub struct SessionHooks {
    pub before_load: Option<Hook>,
    pub after_props_load: Option<Hook>,
    pub before_every_render: Option<Hook>,
    pub on_second_render: Option<Hook>,
    pub after_first_render: Option<Hook>,
    pub on_external_update: Option<Hook>,
}

/// Persisted-state wiring: where state lives in the host store and how it is
/// encoded. Construct with [`PersistConfig::json`].
pub struct PersistConfig<S: 'static> {
    pub key: String,
    pub store: Arc<dyn KeyValueStore>,
    pub poll_interval: Duration,
    encode: Box<dyn Fn(&S) -> Result<String, HookError> + Send + Sync>,
    decode: Box<dyn Fn(&str) -> Result<S, HookError> + Send + Sync>,
}

impl<S> PersistConfig<S>
where
    S: Serialize + DeserializeOwned + 'static,
{
    /// JSON-encoded persistence under `key`.
    pub fn json(key: impl Into<String>, store: Arc<dyn KeyValueStore>, poll_interval: Duration) -> Self {
        Self {
            key: key.into(),
            store,
            poll_interval,
            encode: Box::new(|state| serde_json::to_string(state).map_err(Into::into)),
            decode: Box::new(|raw| serde_json::from_str(raw).map_err(Into::into)),
        }
    }
}

/// An external stream the session polls for changes.
pub struct ExternalConfig<E: 'static> {
    pub stream: Stream<E>,
    pub poll_interval: Duration,
}

/// Host-cache warming run through a [`BatchQueue`] during session setup.
pub struct PreloadConfig {
    items: Vec<String>,
    operation: BatchOperation<String>,
    interval: Duration,
    max_per_batch: Option<usize>,
}

impl PreloadConfig {
    /// Preload `items` with `loader`, a few at a time.
    pub fn new<F, Fut>(items: Vec<String>, loader: F) -> Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BatchError>> + Send + 'static,
    {
        Self {
            items,
            operation: Box::new(move |batch| {
                let fut: BatchFuture = Box::pin(loader(batch));
                fut
            }),
            interval: Duration::from_millis(200),
            max_per_batch: Some(1),
        }
    }

    /// Delay between preload batches (builder).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Items per preload batch (builder).
    pub fn with_max_per_batch(mut self, max: usize) -> Self {
        self.max_per_batch = Some(max);
        self
    }
}

/// Everything a table session is built from. `name` labels error dialogs and
/// log lines; `rows` is the declarative row provider.
pub struct TableConfig<S: 'static, P: 'static, E: 'static = ()> {
    name: String,
    rows: RowProvider<S, P>,
    default_state: Option<S>,
    load_props: Option<PropsLoader<P>>,
    persist: Option<PersistConfig<S>>,
    external: Option<ExternalConfig<E>>,
    preload: Option<PreloadConfig>,
    hooks: SessionHooks,
}

impl<S: 'static, P: 'static, E: 'static> TableConfig<S, P, E> {
    /// A config with just a name and a row provider.
    pub fn new<F>(name: impl Into<String>, rows: F) -> Self
    where
        F: Fn(RenderContext<S, P>) -> Result<Vec<RenderNode>, HookError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            rows: Box::new(rows),
            default_state: None,
            load_props: None,
            persist: None,
            external: None,
            preload: None,
            hooks: SessionHooks::default(),
        }
    }

    /// State used when nothing is persisted yet (builder).
    pub fn with_default_state(mut self, state: S) -> Self {
        self.default_state = Some(state);
        self
    }

    /// Async props loader run once during setup (builder).
    pub fn with_props_loader<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, HookError>> + Send + 'static,
    {
        self.load_props = Some(Box::new(move || {
            let fut: Pin<Box<dyn Future<Output = Result<P, HookError>> + Send>> =
                Box::pin(loader());
            fut
        }));
        self
    }

    /// Persist state through the host store (builder).
    pub fn with_persistence(mut self, persist: PersistConfig<S>) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Poll an external stream for changes (builder).
    pub fn with_external(mut self, stream: Stream<E>, poll_interval: Duration) -> Self {
        self.external = Some(ExternalConfig {
            stream,
            poll_interval,
        });
        self
    }

    /// Warm host caches during setup (builder).
    pub fn with_preload(mut self, preload: PreloadConfig) -> Self {
        self.preload = Some(preload);
        self
    }

    // ── hooks ────────────────────────────────────────────────────────

    /// Hook run once before anything else (builder).
    pub fn on_before_load<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.hooks.before_load = Some(boxed_hook(f));
        self
    }

    /// Hook run once after props finish loading (builder).
    pub fn on_after_props_load<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.hooks.after_props_load = Some(boxed_hook(f));
        self
    }

    /// Hook run at the start of every render pass (builder).
    pub fn on_before_every_render<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.hooks.before_every_render = Some(boxed_hook(f));
        self
    }

    /// Hook run at the start of the second render (builder).
    pub fn on_second_render<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.hooks.on_second_render = Some(boxed_hook(f));
        self
    }

    /// Hook run exactly once, after the first committed render (builder).
    pub fn on_after_first_render<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.hooks.after_first_render = Some(boxed_hook(f));
        self
    }

    /// Hook run when the external poller observes queued changes (builder).
    pub fn on_external_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.hooks.on_external_update = Some(boxed_hook(f));
        self
    }
}

// ---------------------------------------------------------------------------
// TableSession
// ---------------------------------------------------------------------------

struct RenderState<S, P> {
    generation: RenderGeneration,
    last_input: Option<RenderInput<S, P>>,
    last_rows: Option<Vec<TableRow>>,
    opts: RenderOpts,
    /// A render task is queued but has not started yet.
    pending: bool,
    pending_force: bool,
    active: bool,
    setup_done: bool,
    presented: bool,
}

impl<S, P> Default for RenderState<S, P> {
    fn default() -> Self {
        Self {
            generation: RenderGeneration::default(),
            last_input: None,
            last_rows: None,
            opts: RenderOpts::default(),
            pending: false,
            pending_force: false,
            active: false,
            setup_done: false,
            presented: false,
        }
    }
}

enum PassOutcome<S> {
    Continued,
    Dismissed(Option<Arc<S>>),
}

/// The stateful controller behind a [`Table`] handle.
pub struct TableSession<S: 'static, P: 'static, E: 'static = ()> {
    /// Back-reference to the owning `Arc`, for spawned tasks and timer
    /// callbacks. Weak so detached tasks never keep a dead session alive.
    self_ref: Weak<Self>,
    name: String,
    widget: Arc<dyn TableWidget>,
    payload: Stream<SessionPayload<S, P>>,
    timers: TimerRegistry,
    lifecycle: LifecycleRegistry,
    rows: RowProvider<S, P>,
    hooks: SessionHooks,
    load_props: Option<PropsLoader<P>>,
    default_state: Mutex<Option<S>>,
    persist: Option<PersistConfig<S>>,
    external: Mutex<Option<ExternalConfig<E>>>,
    preload: Mutex<Option<PreloadConfig>>,
    /// Set synchronously by the external stream's subscriber; drained by the
    /// poller timer.
    external_dirty: Arc<AtomicBool>,
    render: Mutex<RenderState<S, P>>,
    /// Serializes widget commits across overlapping render passes.
    commit_lock: tokio::sync::Mutex<()>,
}

impl<S, P, E> TableSession<S, P, E>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn new(config: TableConfig<S, P, E>, widget: Arc<dyn TableWidget>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            name: config.name,
            widget,
            payload: Stream::new(SessionPayload::default()),
            timers: TimerRegistry::new(),
            lifecycle: LifecycleRegistry::new(),
            rows: config.rows,
            hooks: config.hooks,
            load_props: config.load_props,
            default_state: Mutex::new(config.default_state),
            persist: config.persist,
            external: Mutex::new(config.external),
            preload: Mutex::new(config.preload),
            external_dirty: Arc::new(AtomicBool::new(false)),
            render: Mutex::new(RenderState::default()),
            commit_lock: tokio::sync::Mutex::new(()),
        })
    }

    // ── render requests ──────────────────────────────────────────────

    /// Coalesce a render request: a burst of N calls before the queued task
    /// starts yields exactly one pass, forced if any caller asked for force.
    fn request_render(&self, force: bool) {
        let Some(session) = self.self_ref.upgrade() else {
            return;
        };
        {
            let mut render = self.render.lock();
            render.pending_force |= force;
            if render.pending {
                return;
            }
            render.pending = true;
        }
        tokio::spawn(async move {
            let force = {
                let mut render = session.render.lock();
                render.pending = false;
                std::mem::take(&mut render.pending_force)
            };
            // Errors are surfaced as a dialog inside render_table.
            let _ = session.render_table(force).await;
        });
    }

    /// One full render pass with top-level error handling: failures are
    /// logged, surfaced as a dismissable dialog naming the session, and —
    /// outside of setup — swallowed so the session stays intact.
    async fn render_table(&self, force: bool) -> Result<Option<Arc<S>>, SessionError> {
        let during_setup = !self.render.lock().setup_done;
        match self.render_pass(force).await {
            Ok(PassOutcome::Dismissed(state)) => Ok(state),
            Ok(PassOutcome::Continued) => Ok(None),
            Err(err) => {
                tracing::error!(session = %self.name, error = %err, "table render failed");
                self.widget
                    .show_error(&format!("Error in table \"{}\"", self.name), &err.to_string())
                    .await;
                if during_setup {
                    self.cleanup();
                    Err(err)
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn render_pass(&self, force: bool) -> Result<PassOutcome<S>, SessionError> {
        // Drain queued payload writes first: a synchronous burst of updates
        // collapses into this single pass, reflecting only the last value.
        self.payload.flush().await;

        if !self.render.lock().setup_done {
            self.setup().await?;
            self.render.lock().setup_done = true;
        }

        self.run_hook("before_every_render", &self.hooks.before_every_render)
            .await?;

        if self.render.lock().generation.is_once() {
            self.run_hook("on_second_render", &self.hooks.on_second_render)
                .await?;
        }

        let input = self.payload.with(RenderInput::of);

        // Memoization: identical snapshot and no force means the provider is
        // not called at all.
        let memoized: Option<Vec<TableRow>> = {
            let render = self.render.lock();
            if !force
                && render
                    .last_input
                    .as_ref()
                    .is_some_and(|prev| prev.matches(&input))
            {
                render.last_rows.clone()
            } else {
                None
            }
        };

        let rows = match memoized {
            Some(rows) => rows,
            None => {
                let context = RenderContext {
                    state: input.state.clone(),
                    props: input.props.clone(),
                };
                let produced = (self.rows)(context).map_err(SessionError::RowProvider)?;
                normalize(produced)
            }
        };

        let rebuild = {
            let mut render = self.render.lock();
            let rebuild = match &render.last_rows {
                None => true,
                Some(prev) => rows_need_rebuild(prev, &rows),
            };
            render.last_rows = Some(rows.clone());
            render.last_input = Some(input);
            rebuild
        };

        if rebuild {
            let compiled = compile_rows(&rows);
            let _commit = self.commit_lock.lock().await;
            self.widget.remove_all_rows();
            for row in compiled {
                self.widget.add_row(row);
            }
            self.widget.reload();
        }

        let first_commit = self.render.lock().generation.is_none();
        if first_commit {
            self.run_hook("after_first_render", &self.hooks.after_first_render)
                .await?;
        }
        self.render.lock().generation.advance();

        let should_present = {
            let mut render = self.render.lock();
            if render.presented {
                false
            } else {
                render.presented = true;
                render.active = true;
                true
            }
        };
        if !should_present {
            return Ok(PassOutcome::Continued);
        }

        self.start_external_poller();
        let fullscreen = self.render.lock().opts.fullscreen;
        // Suspends until the user dismisses the widget.
        if let Err(err) = self.widget.present(fullscreen).await {
            self.cleanup();
            return Err(err.into());
        }

        let final_state = self.payload.with(|p| p.state.clone());
        self.cleanup();
        Ok(PassOutcome::Dismissed(final_state))
    }

    async fn run_hook(&self, name: &'static str, hook: &Option<Hook>) -> Result<(), SessionError> {
        match hook {
            Some(hook) => hook().await.map_err(|source| SessionError::Hook { hook: name, source }),
            None => Ok(()),
        }
    }

    // ── setup ────────────────────────────────────────────────────────

    async fn setup(&self) -> Result<(), SessionError> {
        self.run_hook("before_load", &self.hooks.before_load).await?;

        if let Some(loader) = &self.load_props {
            let props = Arc::new(loader().await.map_err(SessionError::PropsLoad)?);
            self.payload
                .update_sync(move |p| p.with_props(props), UpdateOpts::suppressed())
                .await
                .map_err(SessionError::Payload)?;
        }
        self.run_hook("after_props_load", &self.hooks.after_props_load)
            .await?;

        self.start_payload_subscription();
        self.start_preload();

        if self.persist.is_some() || self.default_state.lock().is_some() {
            self.seed_state().await?;
            self.start_persist_polling();
            self.start_persist_sync();
        }
        Ok(())
    }

    /// Seed session state from the store when a value is persisted, else
    /// from the configured default. Suppressed: setup must not request a
    /// render of a table that has not rendered yet.
    async fn seed_state(&self) -> Result<(), SessionError> {
        let seeded: Option<S> = match &self.persist {
            Some(persist) => match persist.store.read(&persist.key).await? {
                Some(raw) => Some((persist.decode)(&raw).map_err(SessionError::StateCodec)?),
                None => self.default_state.lock().take(),
            },
            None => self.default_state.lock().take(),
        };
        if let Some(state) = seeded {
            let state = Arc::new(state);
            self.payload
                .update_sync(move |p| p.with_state(state), UpdateOpts::suppressed())
                .await
                .map_err(SessionError::Payload)?;
        }
        Ok(())
    }

    // ── lifecycle registrations ──────────────────────────────────────

    fn start_payload_subscription(&self) {
        let weak = self.self_ref.clone();
        let handle = self.payload.register_update_callback(
            RegisterOpts::id(format!("session:{}:render", self.name)),
            move |_old, _new| {
                if let Some(session) = weak.upgrade() {
                    session.request_render(false);
                }
                async { Ok(()) }
            },
        );
        self.lifecycle.start(
            LifecycleKey::PayloadSubscription,
            vec![Cleanup::Run(Box::new(move || handle.remove()))],
            &self.timers,
        );
    }

    fn start_preload(&self) {
        let Some(config) = self.preload.lock().take() else {
            return;
        };
        let PreloadConfig {
            items,
            operation,
            interval,
            max_per_batch,
        } = config;
        let mut queue_config = BatchQueueConfig::new(move |batch: Vec<String>| operation(batch))
            .with_interval(interval)
            .with_is_equal(|a: &String, b: &String| a == b);
        if let Some(max) = max_per_batch {
            queue_config = queue_config.with_max_per_batch(max);
        }
        let queue = BatchQueue::new(queue_config);
        queue.push(items);
        self.lifecycle.start(
            LifecycleKey::Preload,
            vec![Cleanup::Run(Box::new(move || queue.pause()))],
            &self.timers,
        );
    }

    fn start_persist_polling(&self) {
        let Some(persist) = &self.persist else {
            return;
        };
        let weak = self.self_ref.clone();
        let timer_id = self
            .timers
            .register(TimerConfig::every(persist.poll_interval), move || {
                let weak = weak.clone();
                async move {
                    let Some(session) = weak.upgrade() else {
                        return;
                    };
                    if let Err(err) = session.poll_persisted_state().await {
                        tracing::warn!(session = %session.name, error = %err, "persisted-state poll failed");
                    }
                }
            });
        self.lifecycle.start(
            LifecycleKey::PersistedStatePoller,
            vec![Cleanup::Timer(timer_id)],
            &self.timers,
        );
    }

    /// Apply a stored state that differs from the current one. Comparison is
    /// on the encoded form, so no `PartialEq` bound is needed here.
    async fn poll_persisted_state(&self) -> Result<(), SessionError> {
        let Some(persist) = &self.persist else {
            return Ok(());
        };
        let Some(raw) = persist.store.read(&persist.key).await? else {
            return Ok(());
        };
        let current = self.payload.with(|p| p.state.clone());
        let current_encoded = match &current {
            Some(state) => Some((persist.encode)(state).map_err(SessionError::StateCodec)?),
            None => None,
        };
        if current_encoded.as_deref() == Some(raw.as_str()) {
            return Ok(());
        }
        let state = Arc::new((persist.decode)(&raw).map_err(SessionError::StateCodec)?);
        self.payload.update(move |p| p.with_state(state));
        Ok(())
    }

    fn start_persist_sync(&self) {
        if self.persist.is_none() {
            return;
        }
        let weak = self.self_ref.clone();
        let handle = self.payload.register_update_callback(
            RegisterOpts::id(format!("session:{}:persist", self.name)),
            move |_old, new: SessionPayload<S, P>| {
                let weak = weak.clone();
                async move {
                    let Some(session) = weak.upgrade() else {
                        return Ok(());
                    };
                    session
                        .write_persisted_state(new.state)
                        .await
                        .map_err(Into::into)
                }
            },
        );
        self.lifecycle.start(
            LifecycleKey::PersistedStateSync,
            vec![Cleanup::Run(Box::new(move || handle.remove()))],
            &self.timers,
        );
    }

    /// Write state out unless the store already holds the same encoding.
    async fn write_persisted_state(&self, state: Option<Arc<S>>) -> Result<(), SessionError> {
        let (Some(persist), Some(state)) = (&self.persist, state) else {
            return Ok(());
        };
        let encoded = (persist.encode)(&state).map_err(SessionError::StateCodec)?;
        let stored = persist.store.read(&persist.key).await?;
        if stored.as_deref() == Some(encoded.as_str()) {
            return Ok(());
        }
        persist.store.write(&persist.key, &encoded).await?;
        Ok(())
    }

    fn start_external_poller(&self) {
        let (stream, poll_interval) = {
            let external = self.external.lock();
            let Some(config) = external.as_ref() else {
                return;
            };
            (config.stream.clone(), config.poll_interval)
        };

        let flag = Arc::clone(&self.external_dirty);
        let handle = stream.register_update_callback(
            RegisterOpts::id(format!("session:{}:external", self.name)),
            move |_old: E, _new: E| {
                // Set synchronously; the poller decides when a render follows.
                flag.store(true, Ordering::SeqCst);
                async { Ok(()) }
            },
        );

        let weak = self.self_ref.clone();
        let dirty = Arc::clone(&self.external_dirty);
        let timer_id = self
            .timers
            .register(TimerConfig::every(poll_interval), move || {
                let weak = weak.clone();
                let dirty = Arc::clone(&dirty);
                async move {
                    if !dirty.swap(false, Ordering::SeqCst) {
                        return;
                    }
                    let Some(session) = weak.upgrade() else {
                        return;
                    };
                    session.payload.update(|p| p.with_external_bump());
                    if let Some(hook) = &session.hooks.on_external_update {
                        if let Err(err) = hook().await {
                            tracing::warn!(session = %session.name, error = %err, "external update hook failed");
                        }
                    }
                }
            });

        self.lifecycle.start(
            LifecycleKey::ExternalPoller,
            vec![
                Cleanup::Timer(timer_id),
                Cleanup::Run(Box::new(move || handle.remove())),
            ],
            &self.timers,
        );
    }

    /// Full teardown: stop every lifecycle registration and timer, reset the
    /// render bookkeeping. In-flight work completes on its own.
    fn cleanup(&self) {
        self.lifecycle.stop_all(&self.timers);
        self.timers.stop_all();
        *self.render.lock() = RenderState::default();
    }
}

// ---------------------------------------------------------------------------
// Table handle
// ---------------------------------------------------------------------------

/// The public handle around a table session.
///
/// Cloning produces another handle to the same session.
pub struct Table<S: 'static, P: 'static, E: 'static = ()> {
    session: Arc<TableSession<S, P, E>>,
}

impl<S: 'static, P: 'static, E: 'static> Clone for Table<S, P, E> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

/// Build a table session around a host widget.
pub fn get_table<S, P, E>(
    config: TableConfig<S, P, E>,
    widget: Arc<dyn TableWidget>,
) -> Table<S, P, E>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    Table {
        session: TableSession::new(config, widget),
    }
}

impl<S, P, E> Table<S, P, E>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Render and present the table. Resolves with the final state once the
    /// user dismisses the widget.
    pub async fn present(&self, opts: RenderOpts) -> Result<Option<Arc<S>>, SessionError> {
        {
            let mut render = self.session.render.lock();
            render.opts = opts;
            render.last_input = None;
        }
        let result = self.session.render_table(true).await;
        if !self.session.render.lock().presented {
            // The pass never reached presentation; don't leak registrations.
            self.session.cleanup();
        }
        result
    }

    /// Request a coalesced re-render, bypassing memoization.
    pub fn rerender(&self) {
        self.session.request_render(true);
    }

    /// Replace render options; invalidates memoization.
    pub fn set_render_opts(&self, opts: RenderOpts) {
        let mut render = self.session.render.lock();
        render.opts = opts;
        render.last_input = None;
    }

    /// Replace session state. Setting a value equal to the current state is
    /// a no-op: no payload update, no render.
    pub fn set_state(&self, state: S)
    where
        S: PartialEq,
    {
        let unchanged = self
            .session
            .payload
            .with(|p| p.state.as_deref() == Some(&state));
        if unchanged {
            return;
        }
        let state = Arc::new(state);
        self.session.payload.update(move |p| p.with_state(state));
    }

    /// Derive the next state from the current one. Always re-renders.
    pub fn update_state(&self, f: impl FnOnce(Option<Arc<S>>) -> S + Send + 'static) {
        self.session.payload.update(move |p| {
            let next = f(p.state.clone());
            p.with_state(Arc::new(next))
        });
    }

    /// Current state, if any.
    pub fn get_state(&self) -> Option<Arc<S>> {
        self.session.payload.with(|p| p.state.clone())
    }

    /// Current props, if any.
    pub fn get_props(&self) -> Option<Arc<P>> {
        self.session.payload.with(|p| p.props.clone())
    }

    /// Whether the table is currently presented.
    pub fn is_active(&self) -> bool {
        self.session.render.lock().active
    }

    /// Attach (or replace) the externally polled stream. Takes effect
    /// immediately on an active session, otherwise at presentation.
    pub fn connect(&self, stream: Stream<E>, poll_interval: Duration) {
        self.session
            .lifecycle
            .stop(LifecycleKey::ExternalPoller, &self.session.timers);
        *self.session.external.lock() = Some(ExternalConfig {
            stream,
            poll_interval,
        });
        if self.session.render.lock().active {
            self.session.start_external_poller();
        }
    }

    /// Resolve once queued state updates have been applied. Renders they
    /// request may still be in flight.
    pub async fn settled(&self) {
        self.session.payload.flush().await;
    }
}
