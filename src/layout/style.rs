//! BoxStyle: the cascading style record for layout nodes.
//!
//! Every property is an `Option<T>`: `None` means "not set", which at compile
//! time inherits from the nearest ancestor that sets it. Colors and fonts are
//! plain host value strings; this core never interprets them.

/// Horizontal alignment of cell content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// A horizontal border edge: a filler row of `height` points painted in
/// `color` (host default when unset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Border {
    pub height: u32,
    pub color: Option<String>,
}

impl Border {
    /// A 1-point hairline in the given color.
    pub fn hairline(color: impl Into<String>) -> Self {
        Self {
            height: 1,
            color: Some(color.into()),
        }
    }
}

/// Default content-row height when no node in the cascade sets one.
pub const DEFAULT_ROW_HEIGHT: u32 = 44;

/// All style properties for a layout node. `None` means unset (inherit).
///
/// Cascading fields: background/text color, font, alignment, faded flag, row
/// height, padding, margin, and borders. `width` (per-cell) and
/// `debug_outline` never inherit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxStyle {
    // Colors & text
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub font: Option<String>,
    pub align: Option<Align>,
    pub faded: Option<bool>,

    // Rows
    pub row_height: Option<u32>,

    // Box edges (vertical: each materializes as filler rows)
    pub margin_top: Option<u32>,
    pub margin_bottom: Option<u32>,
    pub padding_top: Option<u32>,
    pub padding_bottom: Option<u32>,
    pub border_top: Option<Border>,
    pub border_bottom: Option<Border>,

    // Non-cascading
    /// Percentage width, cells only. Must be within (0, 100].
    pub width: Option<f32>,
    /// Paint hairline outlines around this node's compiled box. Never
    /// inherited.
    pub debug_outline: Option<bool>,
}

impl BoxStyle {
    /// A style with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve this node's style against its parent's resolved style: own
    /// values win, the parent fills the gaps. `width` and `debug_outline`
    /// are excluded from inheritance.
    pub fn inherit(&self, parent: &BoxStyle) -> BoxStyle {
        /// Pick `own` if set, otherwise fall back to `parent`.
        fn pick<T: Clone>(own: &Option<T>, parent: &Option<T>) -> Option<T> {
            if own.is_some() {
                own.clone()
            } else {
                parent.clone()
            }
        }

        BoxStyle {
            background_color: pick(&self.background_color, &parent.background_color),
            text_color: pick(&self.text_color, &parent.text_color),
            font: pick(&self.font, &parent.font),
            align: pick(&self.align, &parent.align),
            faded: pick(&self.faded, &parent.faded),

            row_height: pick(&self.row_height, &parent.row_height),

            margin_top: pick(&self.margin_top, &parent.margin_top),
            margin_bottom: pick(&self.margin_bottom, &parent.margin_bottom),
            padding_top: pick(&self.padding_top, &parent.padding_top),
            padding_bottom: pick(&self.padding_bottom, &parent.padding_bottom),
            border_top: pick(&self.border_top, &parent.border_top),
            border_bottom: pick(&self.border_bottom, &parent.border_bottom),

            width: self.width,
            debug_outline: self.debug_outline,
        }
    }

    /// Height of a content row under this resolved style.
    pub fn resolved_row_height(&self) -> u32 {
        self.row_height.unwrap_or(DEFAULT_ROW_HEIGHT)
    }

    /// Returns `true` if all fields are unset.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validate construction-time constraints. Called by the node
    /// constructors; an out-of-range width is a caller bug surfaced
    /// immediately, never coerced.
    pub(crate) fn validate(&self) -> Result<(), super::LayoutError> {
        if let Some(width) = self.width {
            if !(width > 0.0 && width <= 100.0) {
                return Err(super::LayoutError::InvalidWidth(width));
            }
        }
        Ok(())
    }

    // ── builders ─────────────────────────────────────────────────────

    /// Set the background color (builder).
    pub fn with_background(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }

    /// Set the text color (builder).
    pub fn with_text_color(mut self, color: impl Into<String>) -> Self {
        self.text_color = Some(color.into());
        self
    }

    /// Set the font (builder).
    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }

    /// Set the alignment (builder).
    pub fn with_align(mut self, align: Align) -> Self {
        self.align = Some(align);
        self
    }

    /// Set the content-row height (builder).
    pub fn with_row_height(mut self, height: u32) -> Self {
        self.row_height = Some(height);
        self
    }

    /// Set symmetric vertical margins (builder).
    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin_top = Some(margin);
        self.margin_bottom = Some(margin);
        self
    }

    /// Set symmetric vertical padding (builder).
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding_top = Some(padding);
        self.padding_bottom = Some(padding);
        self
    }

    /// Set identical top and bottom borders (builder).
    pub fn with_border(mut self, border: Border) -> Self {
        self.border_top = Some(border.clone());
        self.border_bottom = Some(border);
        self
    }

    /// Set the percentage width (builder, cells only).
    pub fn with_width(mut self, width: f32) -> Self {
        self.width = Some(width);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        assert!(BoxStyle::new().is_empty());
    }

    #[test]
    fn inherit_fills_unset_fields_from_parent() {
        let parent = BoxStyle::new()
            .with_background("black")
            .with_text_color("white")
            .with_row_height(30);
        let child = BoxStyle::new().with_text_color("red");

        let resolved = child.inherit(&parent);
        assert_eq!(resolved.background_color, Some("black".into()));
        assert_eq!(resolved.text_color, Some("red".into()));
        assert_eq!(resolved.row_height, Some(30));
    }

    #[test]
    fn own_values_always_win() {
        let parent = BoxStyle::new().with_align(Align::Center).with_font("body");
        let child = BoxStyle::new().with_align(Align::Right);

        let resolved = child.inherit(&parent);
        assert_eq!(resolved.align, Some(Align::Right));
        assert_eq!(resolved.font, Some("body".into()));
    }

    #[test]
    fn width_does_not_inherit() {
        let parent = BoxStyle::new().with_width(50.0);
        let child = BoxStyle::new();
        assert_eq!(child.inherit(&parent).width, None);
    }

    #[test]
    fn debug_outline_does_not_inherit() {
        let mut parent = BoxStyle::new();
        parent.debug_outline = Some(true);
        let child = BoxStyle::new();
        assert_eq!(child.inherit(&parent).debug_outline, None);
    }

    #[test]
    fn borders_inherit() {
        let parent = BoxStyle::new().with_border(Border::hairline("#333333"));
        let child = BoxStyle::new();
        let resolved = child.inherit(&parent);
        assert_eq!(resolved.border_top, Some(Border::hairline("#333333")));
        assert_eq!(resolved.border_bottom, Some(Border::hairline("#333333")));
    }

    #[test]
    fn chained_cascade_prefers_the_nearest_setter() {
        let root = BoxStyle::new().with_background("black").with_font("mono");
        let middle = BoxStyle::new().with_background("gray");
        let leaf = BoxStyle::new();

        let resolved = leaf.inherit(&middle.inherit(&root));
        assert_eq!(resolved.background_color, Some("gray".into()));
        assert_eq!(resolved.font, Some("mono".into()));
    }

    #[test]
    fn resolved_row_height_defaults() {
        assert_eq!(BoxStyle::new().resolved_row_height(), DEFAULT_ROW_HEIGHT);
        assert_eq!(BoxStyle::new().with_row_height(20).resolved_row_height(), 20);
    }

    #[test]
    fn validate_rejects_out_of_range_width() {
        assert!(BoxStyle::new().with_width(50.0).validate().is_ok());
        assert!(BoxStyle::new().with_width(0.0).validate().is_err());
        assert!(BoxStyle::new().with_width(-10.0).validate().is_err());
        assert!(BoxStyle::new().with_width(100.5).validate().is_err());
    }
}
