//! Compiled output: row and cell descriptors.
//!
//! A [`RowDescriptor`] is the host-agnostic representation of one displayed
//! row: an ordered cell list, a height, a background color, and optional tap
//! handlers. The compiler produces these fresh on every pass; the session
//! diffs row *sources* by identity and hands descriptors to the host widget
//! verbatim.

use std::fmt;
use std::sync::Arc;

use super::style::Align;

// ---------------------------------------------------------------------------
// Tap handlers
// ---------------------------------------------------------------------------

/// Callback fired when the host reports a row tap.
pub type TapFn = Arc<dyn Fn() + Send + Sync>;

/// Tap behavior attached to a row.
#[derive(Clone, Default)]
pub struct TapHandlers {
    pub on_tap: Option<TapFn>,
    /// Whether the host should dismiss the table after the tap.
    pub dismiss_on_tap: bool,
}

impl TapHandlers {
    /// Handlers that run `f` on tap.
    pub fn on_tap(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_tap: Some(Arc::new(f)),
            dismiss_on_tap: false,
        }
    }

    /// Request dismissal after the tap (builder).
    pub fn dismissing(mut self) -> Self {
        self.dismiss_on_tap = true;
        self
    }
}

impl fmt::Debug for TapHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapHandlers")
            .field("on_tap", &self.on_tap.is_some())
            .field("dismiss_on_tap", &self.dismiss_on_tap)
            .finish()
    }
}

// Handler closures have no useful equality; descriptors compare handler
// *presence*, which is what the determinism guarantee covers.
impl PartialEq for TapHandlers {
    fn eq(&self, other: &Self) -> bool {
        self.on_tap.is_some() == other.on_tap.is_some()
            && self.dismiss_on_tap == other.dismiss_on_tap
    }
}

// ---------------------------------------------------------------------------
// Cell descriptor
// ---------------------------------------------------------------------------

/// What a compiled cell displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Text,
    Image,
    Button,
}

/// One compiled cell: content plus the final resolved presentation values.
#[derive(Debug, Clone, PartialEq)]
pub struct CellDescriptor {
    pub kind: CellKind,
    /// Text content, image identifier, or button label per `kind`.
    pub value: String,
    /// Calibrated percentage width; all cells in a row sum to at most 100.
    pub width: f32,
    pub align: Align,
    pub color: Option<String>,
    pub font: Option<String>,
}

impl CellDescriptor {
    /// A text cell; width is calibrated by the compiler.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Text,
            value: value.into(),
            width: 0.0,
            align: Align::default(),
            color: None,
            font: None,
        }
    }

    /// An image cell referencing a host image identifier.
    pub fn image(value: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Image,
            value: value.into(),
            ..Self::text("")
        }
    }

    /// A button cell with the given label.
    pub fn button(label: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Button,
            value: label.into(),
            ..Self::text("")
        }
    }

    /// Set the alignment (builder).
    pub fn with_align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    /// Set the content color (builder).
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Set the font (builder).
    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Row descriptor
// ---------------------------------------------------------------------------

/// One compiled row handed to the host widget.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDescriptor {
    pub cells: Vec<CellDescriptor>,
    pub height: u32,
    pub background_color: Option<String>,
    pub tap: Option<TapHandlers>,
}

impl RowDescriptor {
    /// A zero-cell filler row (margins, borders, padding).
    pub fn filler(height: u32, background_color: Option<String>) -> Self {
        Self {
            cells: Vec::new(),
            height,
            background_color,
            tap: None,
        }
    }

    /// Whether this row displays no cells (filler or empty content row).
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
