//! Host capability traits.
//!
//! The core never talks to a concrete UI toolkit or storage backend; it is
//! written against these interfaces and the host supplies implementations.
//! [`crate::testing`] ships in-memory fakes for both.

use async_trait::async_trait;

use crate::layout::RowDescriptor;

/// Opaque error produced by a host storage backend.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Host-boundary failures, raised with descriptive messages rather than
/// surfacing a backend's generic error directly.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The table widget cannot be used in this execution context.
    #[error("table widget unavailable: {0}")]
    WidgetUnavailable(String),
    /// The persisted key-value store failed.
    #[error("persisted store failure: {0}")]
    Store(#[source] StoreError),
}

/// A host table widget: a scrollable list of fixed-structure rows.
///
/// Methods take `&self`; widgets handle their own interior mutability so a
/// long-running [`present`](TableWidget::present) never blocks row updates.
#[async_trait]
pub trait TableWidget: Send + Sync {
    /// Append one row.
    fn add_row(&self, row: RowDescriptor);

    /// Remove every row.
    fn remove_all_rows(&self);

    /// Ask the widget to redraw its current rows.
    fn reload(&self);

    /// Show the widget and suspend until the user dismisses it.
    async fn present(&self, fullscreen: bool) -> Result<(), HostError>;

    /// Show a dismissable error dialog.
    async fn show_error(&self, title: &str, message: &str);
}

/// A persisted key-value store (typically file-backed).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn read(&self, key: &str) -> Result<Option<String>, HostError>;

    /// Write `value` under `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), HostError>;
}
