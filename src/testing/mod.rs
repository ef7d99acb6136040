//! Headless host fakes for driving sessions without a real UI.
//!
//! [`TestWidget`] records every widget call and lets tests dismiss a
//! presented table programmatically; [`MemoryStore`] is an in-memory
//! key-value store. Both are ordinary capability implementations, usable
//! from integration tests and downstream crates alike.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::host::{HostError, KeyValueStore, TableWidget};
use crate::layout::RowDescriptor;

// ---------------------------------------------------------------------------
// TestWidget
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWidgetState {
    rows: Vec<RowDescriptor>,
    reload_count: usize,
    remove_all_count: usize,
    presented: bool,
    errors: Vec<(String, String)>,
}

/// A recording table widget.
///
/// `present` suspends until [`dismiss`](TestWidget::dismiss) is called, which
/// mirrors a user closing the table.
#[derive(Default)]
pub struct TestWidget {
    state: Mutex<TestWidgetState>,
    dismissal: Notify,
}

impl TestWidget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rows currently committed to the widget.
    pub fn rows(&self) -> Vec<RowDescriptor> {
        self.state.lock().rows.clone()
    }

    pub fn row_count(&self) -> usize {
        self.state.lock().rows.len()
    }

    /// How many times the widget was asked to redraw.
    pub fn reload_count(&self) -> usize {
        self.state.lock().reload_count
    }

    /// How many times the row set was cleared.
    pub fn remove_all_count(&self) -> usize {
        self.state.lock().remove_all_count
    }

    /// Whether `present` has been called and not yet dismissed.
    pub fn is_presented(&self) -> bool {
        self.state.lock().presented
    }

    /// Error dialogs shown so far, as `(title, message)` pairs.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.state.lock().errors.clone()
    }

    /// Dismiss the presented table, resolving the `present` call. Safe to
    /// call before `present` starts waiting.
    pub fn dismiss(&self) {
        self.state.lock().presented = false;
        self.dismissal.notify_one();
    }
}

#[async_trait]
impl TableWidget for TestWidget {
    fn add_row(&self, row: RowDescriptor) {
        self.state.lock().rows.push(row);
    }

    fn remove_all_rows(&self) {
        let mut state = self.state.lock();
        state.rows.clear();
        state.remove_all_count += 1;
    }

    fn reload(&self) {
        self.state.lock().reload_count += 1;
    }

    async fn present(&self, _fullscreen: bool) -> Result<(), HostError> {
        self.state.lock().presented = true;
        self.dismissal.notified().await;
        Ok(())
    }

    async fn show_error(&self, title: &str, message: &str) {
        self.state
            .lock()
            .errors
            .push((title.to_owned(), message.to_owned()));
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-memory key-value store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A store pre-populated with one entry.
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Arc<Self> {
        let store = Self::default();
        store.entries.lock().insert(key.into(), value.into());
        Arc::new(store)
    }

    /// Copy of the stored entries.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>, HostError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), HostError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_widget_records_commits() {
        let widget = TestWidget::new();
        widget.add_row(RowDescriptor::filler(1, None));
        widget.add_row(RowDescriptor::filler(2, None));
        assert_eq!(widget.row_count(), 2);

        widget.remove_all_rows();
        assert_eq!(widget.row_count(), 0);
        assert_eq!(widget.remove_all_count(), 1);

        widget.reload();
        assert_eq!(widget.reload_count(), 1);
    }

    #[tokio::test]
    async fn present_resolves_on_dismiss() {
        let widget = TestWidget::new();
        let presenter = Arc::clone(&widget);
        let handle = tokio::spawn(async move { presenter.present(false).await });

        // Let present start waiting, then dismiss.
        tokio::task::yield_now().await;
        assert!(widget.is_presented());
        widget.dismiss();
        handle.await.unwrap().unwrap();
        assert!(!widget.is_presented());
    }

    #[tokio::test]
    async fn dismiss_before_present_does_not_hang() {
        let widget = TestWidget::new();
        widget.dismiss();
        widget.present(true).await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.read("missing").await.unwrap(), None);
        store.write("k", "v").await.unwrap();
        assert_eq!(store.read("k").await.unwrap(), Some("v".into()));
    }

    #[tokio::test]
    async fn with_entry_seeds_the_store() {
        let store = MemoryStore::with_entry("state", "{\"count\":3}");
        assert_eq!(store.read("state").await.unwrap(), Some("{\"count\":3}".into()));
    }
}
