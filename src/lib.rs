//! # trestle
//!
//! A reactive, declarative table UI core. Programs describe a scrollable
//! table as a tree of styled boxes and inline cells; trestle renders it,
//! incrementally re-renders it, and wires up events against a host table
//! widget that only understands flat rows of fixed-width cells.
//!
//! The host widget itself is a capability trait — trestle carries the
//! scheduling, reactive-update, and layout-compilation machinery and can be
//! pointed at any table-like display primitive.
//!
//! ## Core Systems
//!
//! - **[`queue`]** — `BatchQueue`: deduplicating, throttled batch processing
//! - **[`stream`]** — `Stream`: reactive data cell with serialized updates
//!   and named subscriber callbacks
//! - **[`layout`]** — `Container`/`CellContainer`/`Cell`: style cascade and
//!   box-to-row compilation
//! - **[`session`]** — `TableSession`: prop/state loading, lifecycle hooks,
//!   render memoization, widget diffing
//! - **[`timer`]** — `TimerRegistry`: keyed repeating timers, bulk teardown
//! - **[`host`]** — capability traits the host implements
//! - **[`testing`]** — headless host fakes

// Scheduling primitives
pub mod queue;
pub mod stream;
pub mod timer;

// Layout
pub mod layout;

// Session orchestration
pub mod session;

// Host boundary
pub mod host;

// Test support
pub mod testing;
