//! Layout nodes: Container, CellContainer, Cell.
//!
//! Trees are cheap and disposable: built once per row-provider invocation,
//! read once by the compiler, then dropped. Children are owned by plain
//! vectors; style inheritance is resolved top-down at compile time, so trees
//! can be assembled in any order before styles are finalized.

use super::row::{CellDescriptor, TapHandlers};
use super::style::BoxStyle;
use super::LayoutError;

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// Produces a cell's content once layout is fully resolved: invoked with the
/// cell's final inherited style and its calibrated percentage width.
pub type CellRenderFn = Box<dyn Fn(&BoxStyle, f32) -> CellDescriptor + Send + Sync>;

/// An inline cell. Content decisions are deferred to the render callback so
/// they can depend on the resolved style and calibrated width.
pub struct Cell {
    style: BoxStyle,
    render: CellRenderFn,
}

impl Cell {
    /// Create a cell from a style and a content callback.
    pub fn new(
        style: BoxStyle,
        render: impl Fn(&BoxStyle, f32) -> CellDescriptor + Send + Sync + 'static,
    ) -> Result<Self, LayoutError> {
        style.validate()?;
        Ok(Self {
            style,
            render: Box::new(render),
        })
    }

    /// A text cell that renders `value` with the resolved style's color,
    /// font, and alignment.
    pub fn text(value: impl Into<String>, style: BoxStyle) -> Result<Self, LayoutError> {
        let value = value.into();
        Self::new(style, move |resolved, _width| {
            let mut cell = CellDescriptor::text(value.clone());
            cell.align = resolved.align.unwrap_or_default();
            cell.color = resolved.text_color.clone();
            cell.font = resolved.font.clone();
            cell
        })
    }

    pub fn style(&self) -> &BoxStyle {
        &self.style
    }

    pub(crate) fn render(&self, resolved: &BoxStyle, width: f32) -> CellDescriptor {
        (self.render)(resolved, width)
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell").field("style", &self.style).finish()
    }
}

// ---------------------------------------------------------------------------
// CellContainer
// ---------------------------------------------------------------------------

/// A styled group of cells. Contributes its children, each resolved against
/// the group's style, to the enclosing container's single row.
#[derive(Debug)]
pub struct CellContainer {
    style: BoxStyle,
    children: Vec<Cell>,
}

impl CellContainer {
    /// Create a cell group.
    pub fn new(children: Vec<Cell>, style: BoxStyle) -> Result<Self, LayoutError> {
        style.validate()?;
        Ok(Self { style, children })
    }

    pub fn style(&self) -> &BoxStyle {
        &self.style
    }

    pub fn children(&self) -> &[Cell] {
        &self.children
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// A child handed to [`Container::new`].
#[derive(Debug)]
pub enum Child {
    Container(Container),
    Cell(Cell),
    CellContainer(CellContainer),
}

impl From<Container> for Child {
    fn from(value: Container) -> Self {
        Self::Container(value)
    }
}

impl From<Cell> for Child {
    fn from(value: Cell) -> Self {
        Self::Cell(value)
    }
}

impl From<CellContainer> for Child {
    fn from(value: CellContainer) -> Self {
        Self::CellContainer(value)
    }
}

/// Partitioned children: either nested boxes or inline cell content, never a
/// mix. Enforced at construction.
#[derive(Debug)]
pub(crate) enum ContainerChildren {
    Empty,
    Boxes(Vec<Container>),
    Inline(Vec<InlineChild>),
}

#[derive(Debug)]
pub(crate) enum InlineChild {
    Cell(Cell),
    Group(CellContainer),
}

/// A styled box. Compiles to one or more host rows.
#[derive(Debug)]
pub struct Container {
    style: BoxStyle,
    children: ContainerChildren,
    tap: Option<TapHandlers>,
}

impl Container {
    /// Create a container.
    ///
    /// Children must be all [`Container`]s or only
    /// [`Cell`]/[`CellContainer`]s; mixing the two kinds is a
    /// construction-time error.
    pub fn new(
        children: Vec<Child>,
        style: BoxStyle,
        tap: Option<TapHandlers>,
    ) -> Result<Self, LayoutError> {
        style.validate()?;

        let has_boxes = children.iter().any(|c| matches!(c, Child::Container(_)));
        let has_inline = children.iter().any(|c| !matches!(c, Child::Container(_)));
        if has_boxes && has_inline {
            return Err(LayoutError::MixedChildren);
        }

        let children = if children.is_empty() {
            ContainerChildren::Empty
        } else if has_boxes {
            ContainerChildren::Boxes(
                children
                    .into_iter()
                    .map(|c| match c {
                        Child::Container(container) => container,
                        _ => unreachable!("partition checked above"),
                    })
                    .collect(),
            )
        } else {
            ContainerChildren::Inline(
                children
                    .into_iter()
                    .map(|c| match c {
                        Child::Cell(cell) => InlineChild::Cell(cell),
                        Child::CellContainer(group) => InlineChild::Group(group),
                        Child::Container(_) => unreachable!("partition checked above"),
                    })
                    .collect(),
            )
        };

        Ok(Self {
            style,
            children,
            tap,
        })
    }

    /// A childless container: compiles to a single empty-content row.
    pub fn empty(style: BoxStyle, tap: Option<TapHandlers>) -> Result<Self, LayoutError> {
        Self::new(Vec::new(), style, tap)
    }

    pub fn style(&self) -> &BoxStyle {
        &self.style
    }

    pub fn tap(&self) -> Option<&TapHandlers> {
        self.tap.as_ref()
    }

    pub(crate) fn children(&self) -> &ContainerChildren {
        &self.children
    }
}
