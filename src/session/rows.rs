//! The session's row-set contract: provider output, normalization, diffing.
//!
//! A row provider returns [`RenderNode`]s; the session normalizes them into a
//! flat [`TableRow`] list (one level of nesting flattened, empties dropped),
//! diffs that list against the previous render by identity, and compiles it
//! to host rows only when the widget actually needs a rebuild.

use std::sync::Arc;

use crate::layout::{BoxStyle, Container, RowDescriptor};

// ---------------------------------------------------------------------------
// TableRow / RenderNode
// ---------------------------------------------------------------------------

/// One normalized entry in a session's row set.
#[derive(Debug, Clone)]
pub enum TableRow {
    /// A container tree; compiles to a variable number of host rows.
    Container(Arc<Container>),
    /// A pre-built host row used verbatim.
    Row(Arc<RowDescriptor>),
}

impl TableRow {
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Container(_))
    }

    /// Identity comparison: same allocation, not same value. Deep comparison
    /// is deliberately not offered here.
    pub fn same_identity(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Container(a), Self::Container(b)) => Arc::ptr_eq(a, b),
            (Self::Row(a), Self::Row(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// What a row provider returns: rows, one level of row groups, and empty
/// slots (dropped during normalization).
#[derive(Debug, Clone)]
pub enum RenderNode {
    Single(TableRow),
    Many(Vec<TableRow>),
    Empty,
}

impl From<Container> for RenderNode {
    fn from(value: Container) -> Self {
        Self::Single(TableRow::Container(Arc::new(value)))
    }
}

impl From<Arc<Container>> for RenderNode {
    fn from(value: Arc<Container>) -> Self {
        Self::Single(TableRow::Container(value))
    }
}

impl From<RowDescriptor> for RenderNode {
    fn from(value: RowDescriptor) -> Self {
        Self::Single(TableRow::Row(Arc::new(value)))
    }
}

impl From<Arc<RowDescriptor>> for RenderNode {
    fn from(value: Arc<RowDescriptor>) -> Self {
        Self::Single(TableRow::Row(value))
    }
}

impl From<Vec<TableRow>> for RenderNode {
    fn from(value: Vec<TableRow>) -> Self {
        Self::Many(value)
    }
}

/// Flatten provider output one level and drop empty entries.
pub(crate) fn normalize(nodes: Vec<RenderNode>) -> Vec<TableRow> {
    let mut rows = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            RenderNode::Single(row) => rows.push(row),
            RenderNode::Many(group) => rows.extend(group),
            RenderNode::Empty => {}
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Diffing & compilation
// ---------------------------------------------------------------------------

/// Whether the host widget needs a clear-and-readd.
///
/// Containers compile to a variable number of host rows, so their presence
/// always forces a rebuild; plain rows rebuild only when a count or an
/// identity changed.
pub(crate) fn rows_need_rebuild(prev: &[TableRow], next: &[TableRow]) -> bool {
    if prev.len() != next.len() {
        return true;
    }
    if prev.iter().chain(next.iter()).any(TableRow::is_container) {
        return true;
    }
    prev.iter()
        .zip(next.iter())
        .any(|(a, b)| !a.same_identity(b))
}

/// Compile a normalized row set into the flat host row list.
pub(crate) fn compile_rows(rows: &[TableRow]) -> Vec<RowDescriptor> {
    let root = BoxStyle::default();
    rows.iter()
        .flat_map(|row| match row {
            TableRow::Container(container) => container.compile_with(&root),
            TableRow::Row(row) => vec![(**row).clone()],
        })
        .collect()
}
