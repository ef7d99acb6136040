//! Layout tree: styled boxes compiled to flat host rows.
//!
//! - [`style`] — `BoxStyle` cascade record and inheritance
//! - [`node`] — `Container` / `CellContainer` / `Cell` tree nodes
//! - [`row`] — compiled `RowDescriptor` / `CellDescriptor` output
//! - [`compile`] — box-to-row compilation: fillers, border collapse,
//!   percentage width calibration

pub mod compile;
pub mod node;
pub mod row;
pub mod style;

pub use node::{Cell, CellContainer, CellRenderFn, Child, Container};
pub use row::{CellDescriptor, CellKind, RowDescriptor, TapFn, TapHandlers};
pub use style::{Align, Border, BoxStyle, DEFAULT_ROW_HEIGHT};

/// Construction-time errors for layout trees. These indicate caller bugs and
/// are never coerced or deferred to compile time.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// A container's children mixed nested containers with inline cells.
    #[error("container children must be all containers or only cells/cell groups, not a mix")]
    MixedChildren,
    /// A cell width outside (0, 100].
    #[error("invalid cell width {0}: must be within (0, 100]")]
    InvalidWidth(f32),
}
