//! halo-grid: a distributed regular 3D grid with ghost-cell halo exchange.
//!
//! The domain is a fixed `nx x ny x nz` box of cells, partitioned across a
//! process group. Each process owns a subset of cells, keeps ghost copies of
//! remote neighbors, and refreshes them with non-blocking halo rounds.
//!
//! - **Topology** ([`topology`]): dense global cell ids, index and
//!   coordinate arithmetic, cardinal neighbor slots with optional per-axis
//!   periodicity.
//! - **Directory** ([`directory`]): replicated cell-to-owner mapping,
//!   rebuilt collectively after every ownership change.
//! - **Partitioning** ([`partition`]): deterministic native backend with
//!   block, random, RCB, RIB, HSFC, and graph-growth strategies.
//! - **Exchange lists** ([`exchange`]): per-process send/receive lists and
//!   inner/boundary classification, derived from directory plus adjacency.
//! - **Communication** ([`algs`]): communicator abstraction (serial,
//!   in-process thread groups, MPI behind `mpi-support`) and the halo engine.
//! - **Grid façade** ([`grid`]): owns the stores and drives the collective
//!   construction pipeline.
//!
//! # Feature flags
//!
//! - `check-invariants`: heavyweight structural validation (directory cover,
//!   ghost-store shape) in release builds; always on under `debug_assertions`.
//! - `mpi-support`: the `MpiComm` backend over rsmpi.
//!
//! # Example
//!
//! ```
//! use halo_grid::prelude::*;
//!
//! #[derive(Default)]
//! struct Fluid {
//!     density: [f64; 1],
//! }
//!
//! const DENSITY: FieldId = FieldId::new(0);
//!
//! impl CellPayload for Fluid {
//!     fn layout(field: FieldId) -> Option<FieldLayout> {
//!         (field == DENSITY).then_some(FieldLayout::of::<f64>(1))
//!     }
//!     fn field_bytes(&self, field: FieldId) -> Option<&[u8]> {
//!         (field == DENSITY).then(|| bytemuck::cast_slice(&self.density))
//!     }
//!     fn field_bytes_mut(&mut self, field: FieldId) -> Option<&mut [u8]> {
//!         (field == DENSITY).then(|| bytemuck::cast_slice_mut(&mut self.density))
//!     }
//! }
//!
//! let mut grid: Grid<Fluid, NoComm> = Grid::new(
//!     NoComm,
//!     GridConfig {
//!         dims: [8, 8, 8],
//!         ..GridConfig::default()
//!     },
//! )?;
//!
//! for id in grid.cells().collect::<Vec<_>>() {
//!     grid.payload_mut(id).unwrap().density[0] = 1.0;
//! }
//! grid.start_exchange(DENSITY)?;
//! // ... compute on grid.inner_cells() here ...
//! grid.wait_all()?;
//! # Ok::<(), halo_grid::GridError>(())
//! ```

pub mod algs;
pub mod debug_invariants;
pub mod directory;
pub mod exchange;
pub mod grid;
pub mod grid_error;
pub mod partition;
pub mod topology;

pub use grid_error::GridError;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, LocalComm, NoComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::halo::{CellPayload, FieldId, FieldLayout, HaloExchange};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::directory::Directory;
    pub use crate::exchange::ExchangeLists;
    pub use crate::grid::{Grid, GridConfig};
    pub use crate::grid_error::GridError;
    pub use crate::partition::{
        Capability, NativePartitioner, PartitionCallbacks, PartitionOutcome, Strategy,
    };
    pub use crate::topology::{Axis, BoundingBox, Cell, CellId, GridTopology, NEIGHBOR_SLOTS};
}
