//! Grid topology: cell identifiers, cell records, and index arithmetic.

pub mod cell;
pub mod indexing;

pub use cell::{Cell, CellId, NEIGHBOR_SLOTS};
pub use indexing::{Axis, BoundingBox, GridTopology};
