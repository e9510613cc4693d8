//! `CellId`: a strong, zero-cost handle for grid cells, and the per-cell
//! record stored by the grid.
//!
//! A `CellId` is a dense global identifier in `[0, n_total)`, unique across
//! the whole domain. It is `repr(transparent)` over `u64` so it can travel
//! on the wire as a plain integer.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::topology::indexing::GridTopology;

/// Number of cardinal neighbor slots per cell, ordered `(-x,+x,-y,+y,-z,+z)`.
pub const NEIGHBOR_SLOTS: usize = 6;

/// Dense global cell identifier.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Pod,
    Zeroable,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct CellId(u64);

impl CellId {
    /// Creates a new `CellId` from a raw `u64` value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        CellId(raw)
    }

    /// Returns the inner `u64` value of this `CellId`.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellId").field(&self.0).finish()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One grid cell as stored by a process: base-grid indices, corner
/// coordinates, cardinal neighbor slots, boundary classification, and the
/// user payload.
///
/// An absent neighbor (non-periodic domain edge) is `None`; there is no
/// numeric sentinel. The payload is `None` until the owning grid allocates
/// it, which happens only once ownership and the exchange lists are final.
#[derive(Debug)]
pub struct Cell<P> {
    /// Base-grid `(i,j,k)` indices of this cell.
    pub indices: [u32; 3],
    /// Physical coordinates of the low corner of the cell.
    pub corner: [f64; 3],
    /// Global ids of the cardinal neighbors, `(-x,+x,-y,+y,-z,+z)`.
    pub neighbors: [Option<CellId>; NEIGHBOR_SLOTS],
    /// True iff at least one neighbor is owned by a different process.
    pub boundary: bool,
    /// User payload; allocated late, dropped with the grid.
    pub payload: Option<P>,
}

impl<P> Cell<P> {
    /// Build a cell record at `id`, deriving indices, corner coordinates,
    /// and neighbor slots from the topology.
    pub fn at(topo: &GridTopology, id: CellId) -> Self {
        Self {
            indices: topo.indices(id),
            corner: topo.corner(id),
            neighbors: topo.neighbors(id),
            boundary: false,
            payload: None,
        }
    }

    /// Build a ghost record for a remotely owned cell. Neighbor data for
    /// remote cells is not locally known; indices and coordinates are filled
    /// in by the ghost metadata round.
    pub fn ghost(_id: CellId) -> Self {
        Self {
            indices: [0; 3],
            corner: [0.0; 3],
            neighbors: [None; NEIGHBOR_SLOTS],
            boundary: false,
            payload: None,
        }
    }
}
