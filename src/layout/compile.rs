//! Box-to-row compilation.
//!
//! Converts a container tree into the flat row list a host table widget
//! requires: resolves the style cascade top-down, materializes margins,
//! borders, and padding as zero-cell filler rows, collapses doubled borders
//! between adjacent boxes, and calibrates percentage cell widths.

use super::node::{Container, ContainerChildren, InlineChild};
use super::row::{CellDescriptor, RowDescriptor, TapHandlers};
use super::style::{Border, BoxStyle};

/// Border color used for `debug_outline` boxes that declare no border of
/// their own.
const DEBUG_OUTLINE_COLOR: &str = "#ff0000";

// ---------------------------------------------------------------------------
// CompiledBox
// ---------------------------------------------------------------------------

/// A compiled container, kept structured until its parent has had the chance
/// to collapse borders between siblings. `into_rows` materializes the filler
/// rows in their fixed order.
struct CompiledBox {
    margin_top: u32,
    border_top: Option<Border>,
    padding_top: u32,
    content: Vec<RowDescriptor>,
    padding_bottom: u32,
    border_bottom: Option<Border>,
    margin_bottom: u32,
    /// Resolved background; paints the padding fillers.
    background: Option<String>,
}

impl CompiledBox {
    fn into_rows(self) -> Vec<RowDescriptor> {
        let mut rows = Vec::with_capacity(self.content.len() + 6);
        if self.margin_top > 0 {
            rows.push(RowDescriptor::filler(self.margin_top, None));
        }
        if let Some(border) = self.border_top {
            rows.push(RowDescriptor::filler(border.height, border.color));
        }
        if self.padding_top > 0 {
            rows.push(RowDescriptor::filler(self.padding_top, self.background.clone()));
        }
        rows.extend(self.content);
        if self.padding_bottom > 0 {
            rows.push(RowDescriptor::filler(self.padding_bottom, self.background));
        }
        if let Some(border) = self.border_bottom {
            rows.push(RowDescriptor::filler(border.height, border.color));
        }
        if self.margin_bottom > 0 {
            rows.push(RowDescriptor::filler(self.margin_bottom, None));
        }
        rows
    }
}

/// Suppress the top border of any box directly following a bottom-bordered
/// box with no margin in between. Prevents doubled hairlines where two
/// bordered boxes meet.
fn collapse_borders(blocks: &mut [CompiledBox]) {
    for i in 1..blocks.len() {
        let collapsible = blocks[i].border_top.is_some()
            && blocks[i - 1].border_bottom.is_some()
            && blocks[i - 1].margin_bottom == 0
            && blocks[i].margin_top == 0;
        if collapsible {
            blocks[i].border_top = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Width calibration
// ---------------------------------------------------------------------------

/// Resolve per-cell percentage widths for one row.
///
/// Declared widths are kept; the remaining percentage is split evenly among
/// undeclared cells; if the total exceeds 100, cells are truncated
/// left-to-right so earlier cells keep their allocation.
pub(crate) fn calibrate_widths(declared: &[Option<f32>]) -> Vec<f32> {
    let declared_sum: f32 = declared.iter().flatten().sum();
    let unset_count = declared.iter().filter(|w| w.is_none()).count();
    let fill = if unset_count > 0 {
        ((100.0 - declared_sum) / unset_count as f32).max(0.0)
    } else {
        0.0
    };

    let mut remaining = 100.0_f32;
    declared
        .iter()
        .map(|w| {
            let wanted = w.unwrap_or(fill);
            let granted = wanted.min(remaining).max(0.0);
            remaining -= granted;
            granted
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Container compilation
// ---------------------------------------------------------------------------

impl Container {
    /// Compile this tree into host rows, starting the cascade from an empty
    /// resolved style.
    pub fn compile(&self) -> Vec<RowDescriptor> {
        self.compile_with(&BoxStyle::default())
    }

    /// Compile with an explicit inherited style at the root.
    pub fn compile_with(&self, inherited: &BoxStyle) -> Vec<RowDescriptor> {
        self.compile_box(inherited, None).into_rows()
    }

    fn compile_box(&self, inherited: &BoxStyle, inherited_tap: Option<&TapHandlers>) -> CompiledBox {
        let resolved = self.style().inherit(inherited);
        // Non-overriding tap inheritance: a child's own handlers win.
        let tap = self.tap().or(inherited_tap).cloned();

        let content = match self.children() {
            ContainerChildren::Empty => {
                vec![RowDescriptor {
                    cells: Vec::new(),
                    height: resolved.resolved_row_height(),
                    background_color: resolved.background_color.clone(),
                    tap: tap.clone(),
                }]
            }
            ContainerChildren::Boxes(children) => {
                let mut blocks: Vec<CompiledBox> = children
                    .iter()
                    .map(|child| child.compile_box(&resolved, tap.as_ref()))
                    .collect();
                collapse_borders(&mut blocks);
                blocks.into_iter().flat_map(CompiledBox::into_rows).collect()
            }
            ContainerChildren::Inline(children) => {
                vec![self.compile_inline_row(children, &resolved, tap.clone())]
            }
        };

        let mut compiled = CompiledBox {
            margin_top: resolved.margin_top.unwrap_or(0),
            border_top: resolved.border_top.clone(),
            padding_top: resolved.padding_top.unwrap_or(0),
            content,
            padding_bottom: resolved.padding_bottom.unwrap_or(0),
            border_bottom: resolved.border_bottom.clone(),
            margin_bottom: resolved.margin_bottom.unwrap_or(0),
            background: resolved.background_color.clone(),
        };

        if resolved.debug_outline == Some(true) {
            let outline = Border::hairline(DEBUG_OUTLINE_COLOR);
            compiled.border_top.get_or_insert_with(|| outline.clone());
            compiled.border_bottom.get_or_insert(outline);
        }

        compiled
    }

    /// Flatten inline children to cells, calibrate widths, and produce the
    /// single content row.
    fn compile_inline_row(
        &self,
        children: &[InlineChild],
        resolved: &BoxStyle,
        tap: Option<TapHandlers>,
    ) -> RowDescriptor {
        // Each cell resolves against the enclosing group's style where there
        // is one, else directly against this container.
        let mut flat: Vec<(&super::node::Cell, BoxStyle)> = Vec::new();
        for child in children {
            match child {
                InlineChild::Cell(cell) => flat.push((cell, resolved.clone())),
                InlineChild::Group(group) => {
                    let group_resolved = group.style().inherit(resolved);
                    for cell in group.children() {
                        flat.push((cell, group_resolved.clone()));
                    }
                }
            }
        }

        let declared: Vec<Option<f32>> = flat.iter().map(|(cell, _)| cell.style().width).collect();
        let widths = calibrate_widths(&declared);

        let cells: Vec<CellDescriptor> = flat
            .iter()
            .zip(widths)
            .map(|((cell, parent), width)| {
                let cell_resolved = cell.style().inherit(parent);
                let mut descriptor = cell.render(&cell_resolved, width);
                descriptor.width = width;
                descriptor
            })
            .collect();

        RowDescriptor {
            cells,
            height: resolved.resolved_row_height(),
            background_color: resolved.background_color.clone(),
            tap,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
