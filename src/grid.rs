//! `Grid`: the distributed regular-grid façade.
//!
//! One `Grid` instance per process owns its partition of the domain: the
//! local cell store, the ghost (remote) store, the replicated directory, and
//! the exchange lists, and drives halo rounds through the engine.
//!
//! Construction and every list/directory rebuild are collective: all ranks
//! must call them in the same order, and each call blocks until the slowest
//! participant's messages arrive. There is no detection or timeout for a
//! rank that skips or reorders a collective.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::halo::{CellMeta, CellPayload, FieldId, HaloExchange};
use crate::debug_invariants::DebugInvariants;
use crate::directory::{Directory, initial_range};
use crate::exchange::ExchangeLists;
use crate::grid_error::GridError;
use crate::partition::{NativePartitioner, PartitionCallbacks, Strategy};
use crate::topology::{Axis, BoundingBox, Cell, CellId, GridTopology, NEIGHBOR_SLOTS};

/// Construction-time configuration of a [`Grid`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GridConfig {
    /// Cell counts per axis.
    pub dims: [u32; 3],
    /// Physical extent of the domain.
    pub bounds: BoundingBox,
    /// Load-balancing strategy for the initial balance pass.
    pub strategy: Strategy,
    /// Seed for randomized strategies; fixed so runs are reproducible.
    pub rng_seed: u64,
    /// Per-axis periodicity flags.
    pub periodic: [bool; 3],
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            dims: [1, 1, 1],
            bounds: BoundingBox::unit(),
            strategy: Strategy::Rcb,
            rng_seed: 42,
            periodic: [false; 3],
        }
    }
}

/// Distributed regular grid with ghost-cell halo exchange.
pub struct Grid<P: CellPayload, C: Communicator> {
    comm: C,
    topology: GridTopology,
    directory: Directory,
    local: BTreeMap<CellId, Cell<P>>,
    remote: BTreeMap<CellId, Cell<P>>,
    lists: ExchangeLists,
    engine: HaloExchange<C>,
    strategy: Strategy,
    rng_seed: u64,
    epoch: u32,
}

impl<P: CellPayload, C: Communicator> Grid<P, C> {
    /// Build a grid collectively over the communicator's group.
    ///
    /// Pipeline: balanced initial assignment, directory sync, neighbor
    /// lists, initial balance under `config.strategy`, directory sync and
    /// neighbor lists again, exchange lists, payload allocation, ghost
    /// metadata sync. Every rank must construct with identical `config`.
    pub fn new(comm: C, config: GridConfig) -> Result<Self, GridError> {
        let mut topology = GridTopology::new(config.dims, config.bounds)?;
        for axis in Axis::ALL {
            topology.set_periodic(axis, config.periodic[axis.index()]);
        }

        let mut grid = Self {
            comm,
            topology,
            directory: Directory::new(),
            local: BTreeMap::new(),
            remote: BTreeMap::new(),
            lists: ExchangeLists::default(),
            engine: HaloExchange::new(),
            strategy: config.strategy,
            rng_seed: config.rng_seed,
            epoch: 0,
        };

        grid.build_initial_cells();
        grid.sync_directory()?;
        grid.rebuild_neighbor_lists();

        grid.initial_balance()?;
        grid.sync_directory()?;
        grid.rebuild_neighbor_lists();

        grid.rebuild_exchange_lists()?;
        grid.allocate_payloads();
        grid.sync_ghost_metadata()?;

        grid.log_summary();
        Ok(grid)
    }

    /// Rank of this process.
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of processes in the group.
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// Block until every rank reaches this call.
    pub fn barrier(&self) {
        self.comm.barrier();
    }

    pub fn topology(&self) -> &GridTopology {
        &self.topology
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// The send/receive lists of the current directory generation.
    pub fn exchange_lists(&self) -> &ExchangeLists {
        &self.lists
    }

    /// `(local cell, destination rank)` pairs of the current send list.
    pub fn send_list(&self) -> impl Iterator<Item = (CellId, usize)> + '_ {
        self.lists.send_iter()
    }

    /// `(remote cell, source rank)` pairs of the current receive list.
    pub fn receive_list(&self) -> impl Iterator<Item = (CellId, usize)> + '_ {
        self.lists.recv_iter()
    }

    // --- iteration ----------------------------------------------------------

    /// All locally owned cells, in id order.
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.local.keys().copied()
    }

    /// Locally owned cells whose neighbors are all local.
    pub fn inner_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.local
            .iter()
            .filter(|(_, c)| !c.boundary)
            .map(|(&id, _)| id)
    }

    /// Locally owned cells with at least one remotely owned neighbor.
    pub fn boundary_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.local
            .iter()
            .filter(|(_, c)| c.boundary)
            .map(|(&id, _)| id)
    }

    /// Ghost cells owned elsewhere but adjacent to a local cell.
    pub fn remote_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.remote.keys().copied()
    }

    // --- lookup -------------------------------------------------------------

    /// Payload of `id`, local or ghost; `None` if this process holds neither.
    pub fn payload(&self, id: CellId) -> Option<&P> {
        self.local
            .get(&id)
            .or_else(|| self.remote.get(&id))
            .and_then(|c| c.payload.as_ref())
    }

    /// Mutable payload of `id`, local or ghost.
    pub fn payload_mut(&mut self, id: CellId) -> Option<&mut P> {
        self.local
            .get_mut(&id)
            .or_else(|| self.remote.get_mut(&id))
            .and_then(|c| c.payload.as_mut())
    }

    /// Neighbor slots of a locally owned cell, ordered `(-x,+x,-y,+y,-z,+z)`.
    /// Returns `None` for non-local ids: neighbor data for remote cells is
    /// not locally known.
    pub fn neighbors(&self, id: CellId) -> Option<[Option<CellId>; NEIGHBOR_SLOTS]> {
        self.local.get(&id).map(|c| c.neighbors)
    }

    /// Whether a locally owned cell is boundary-classified.
    pub fn is_boundary(&self, id: CellId) -> Option<bool> {
        self.local.get(&id).map(|c| c.boundary)
    }

    /// Low-corner coordinates of a cell held locally (owned or ghost).
    pub fn cell_corner(&self, id: CellId) -> Option<[f64; 3]> {
        self.local
            .get(&id)
            .or_else(|| self.remote.get(&id))
            .map(|c| c.corner)
    }

    /// Center coordinates of a cell held locally (owned or ghost).
    pub fn cell_center(&self, id: CellId) -> Option<[f64; 3]> {
        let spacing = self.topology.spacing();
        self.cell_corner(id)
            .map(|c| std::array::from_fn(|a| c[a] + 0.5 * spacing[a]))
    }

    /// Cell size per axis (uniform over the grid).
    pub fn cell_size(&self) -> [f64; 3] {
        self.topology.spacing()
    }

    // --- halo rounds --------------------------------------------------------

    /// Start a non-blocking halo round for `field`. At most one round may be
    /// in flight; overlap local work over [`Grid::inner_cells`] before
    /// calling [`Grid::wait_all`].
    pub fn start_exchange(&mut self, field: FieldId) -> Result<(), GridError> {
        let epoch = self.next_epoch();
        self.engine
            .start(&self.comm, field, &self.lists, &self.local, epoch)
    }

    /// Block until the in-flight round completes and every ghost payload is
    /// filled, then release all transport state.
    pub fn wait_all(&mut self) -> Result<(), GridError> {
        self.engine.wait_all(&mut self.remote)
    }

    /// Toggle periodicity on one axis and rebuild everything derived from
    /// the neighbor topology: neighbor lists, exchange lists, ghost stores,
    /// ghost metadata. Collective; ownership is unaffected.
    pub fn set_periodic(&mut self, axis: Axis, on: bool) -> Result<(), GridError> {
        self.topology.set_periodic(axis, on);
        self.rebuild_neighbor_lists();
        self.rebuild_exchange_lists()?;
        self.allocate_payloads();
        self.sync_ghost_metadata()
    }

    /// Log a one-line diagnostic summary of this rank's partition.
    pub fn log_summary(&self) {
        info!(
            "rank {}/{}: {} local cells ({} boundary), {} ghosts, strategy {}",
            self.rank(),
            self.size(),
            self.local.len(),
            self.local.values().filter(|c| c.boundary).count(),
            self.remote.len(),
            self.strategy
        );
    }

    // --- construction internals ---------------------------------------------

    fn next_epoch(&mut self) -> u32 {
        // Identical sequence of collective calls on every rank keeps the
        // per-rank counters in lock-step.
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    fn build_initial_cells(&mut self) {
        let range = initial_range(self.topology.n_total(), self.size(), self.rank());
        for raw in range {
            let id = CellId::new(raw);
            self.local.insert(id, Cell::at(&self.topology, id));
        }
        debug!("rank {}: seeded {} cells", self.rank(), self.local.len());
    }

    fn sync_directory(&mut self) -> Result<(), GridError> {
        let ids: Vec<CellId> = self.local.keys().copied().collect();
        let epoch = self.next_epoch();
        self.directory.sync(&self.comm, &ids, epoch)?;
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        self.directory.validate_cover(self.topology.n_total())?;
        Ok(())
    }

    fn rebuild_neighbor_lists(&mut self) {
        for (&id, cell) in self.local.iter_mut() {
            cell.neighbors = self.topology.neighbors(id);
        }
    }

    fn initial_balance(&mut self) -> Result<(), GridError> {
        let outcome = {
            let callbacks = GridCallbacks {
                topology: &self.topology,
                directory: &self.directory,
            };
            NativePartitioner::new(self.rng_seed).partition(
                &callbacks,
                self.strategy,
                self.size(),
                self.rank(),
            )?
        };

        // Metadata-only transfer: this runs before any payload exists, so
        // imported cells are rebuilt from their global id.
        for &(id, _dest) in &outcome.exports {
            self.local.remove(&id);
            self.directory.remove(id);
        }
        let my_rank = self.rank();
        for &id in &outcome.imports {
            self.local.insert(id, Cell::at(&self.topology, id));
            self.directory.insert(id, my_rank);
        }
        Ok(())
    }

    fn rebuild_exchange_lists(&mut self) -> Result<(), GridError> {
        let rank = self.rank();
        self.lists = ExchangeLists::build(&mut self.local, &self.directory, rank)?;
        Ok(())
    }

    /// Populate the ghost store in lock-step with the receive list and hand
    /// every cell its payload. Payloads live inside the store records and
    /// are dropped with the grid.
    fn allocate_payloads(&mut self) {
        let expected: Vec<CellId> = self.lists.recv_iter().map(|(id, _)| id).collect();
        self.remote.retain(|id, _| self.lists.expects(*id));
        for id in expected {
            self.remote.entry(id).or_insert_with(|| Cell::ghost(id));
        }
        for cell in self.local.values_mut().chain(self.remote.values_mut()) {
            cell.payload.get_or_insert_with(P::default);
        }
    }

    /// Ship indices and corner coordinates of every boundary cell to the
    /// ranks that hold it as a ghost.
    fn sync_ghost_metadata(&mut self) -> Result<(), GridError> {
        self.debug_assert_invariants();

        let epoch = self.next_epoch();
        let recvs: Vec<(CellId, usize, C::RecvHandle)> = self
            .lists
            .recv_iter()
            .map(|(id, src)| {
                let h = self.comm.irecv(
                    src,
                    CommTag::for_cell(epoch, id),
                    std::mem::size_of::<CellMeta>(),
                );
                (id, src, h)
            })
            .collect();

        let mut sends = Vec::with_capacity(self.lists.send_len());
        for (id, dest) in self.lists.send_iter() {
            let cell = self.local.get(&id).ok_or(GridError::MissingCell(id))?;
            let meta = CellMeta::new(cell.indices, cell.corner);
            sends.push(
                self.comm
                    .isend(dest, CommTag::for_cell(epoch, id), bytemuck::bytes_of(&meta)),
            );
        }

        let mut first_err = None;
        for (id, src, h) in recvs {
            let Some(data) = h.wait() else {
                first_err.get_or_insert(GridError::CommError {
                    neighbor: src,
                    detail: format!("metadata receive for cell {id} yielded no data"),
                });
                continue;
            };
            if data.len() != std::mem::size_of::<CellMeta>() {
                first_err.get_or_insert(GridError::WireSizeMismatch {
                    cell: id,
                    expected: std::mem::size_of::<CellMeta>(),
                    got: data.len(),
                });
                continue;
            }
            let meta: CellMeta = *bytemuck::from_bytes(&data);
            if let Some(ghost) = self.remote.get_mut(&id) {
                ghost.indices = meta.indices;
                ghost.corner = meta.corner;
            }
        }
        for s in sends {
            let _ = s.wait();
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<P: CellPayload, C: Communicator> DebugInvariants for Grid<P, C> {
    fn validate_invariants(&self) -> Result<(), GridError> {
        self.directory.validate_cover(self.topology.n_total())?;
        for (id, _src) in self.lists.recv_iter() {
            if !self.remote.contains_key(&id) {
                return Err(GridError::StoreMismatch(format!(
                    "receive-list cell {id} has no ghost record"
                )));
            }
        }
        if self.remote.len() != self.lists.recv_len() {
            return Err(GridError::StoreMismatch(format!(
                "{} ghost records vs {} receive-list entries",
                self.remote.len(),
                self.lists.recv_len()
            )));
        }
        for (id, _dest) in self.lists.send_iter() {
            if !self.local.contains_key(&id) {
                return Err(GridError::StoreMismatch(format!(
                    "send-list cell {id} is not locally owned"
                )));
            }
        }
        if let Some(id) = self.local.keys().find(|id| self.remote.contains_key(id)) {
            return Err(GridError::StoreMismatch(format!(
                "cell {id} is in both the local and ghost store"
            )));
        }
        Ok(())
    }
}

/// Callback adapter exposing the grid's replicated view to the partitioner.
struct GridCallbacks<'a> {
    topology: &'a GridTopology,
    directory: &'a Directory,
}

impl PartitionCallbacks for GridCallbacks<'_> {
    fn census(&self) -> Vec<(CellId, usize)> {
        let n = self.topology.n_total();
        (0..n)
            .map(|raw| {
                let id = CellId::new(raw);
                // The directory is a total cover here; construction syncs it
                // immediately before the balance pass.
                (id, self.directory.owner(id).unwrap_or(0))
            })
            .collect()
    }

    fn coordinates(&self, id: CellId) -> [f64; 3] {
        self.topology.corner(id)
    }

    fn num_edges(&self, id: CellId) -> usize {
        self.topology.neighbors(id).iter().flatten().count()
    }

    fn edges(&self, id: CellId) -> Vec<(CellId, usize)> {
        self.topology
            .neighbors(id)
            .into_iter()
            .flatten()
            .map(|nbr| (nbr, self.directory.owner(nbr).unwrap_or(0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::halo::FieldLayout;

    #[derive(Default)]
    struct Scalar {
        rho: [f64; 1],
    }

    const RHO: FieldId = FieldId::new(0);

    impl CellPayload for Scalar {
        fn layout(field: FieldId) -> Option<FieldLayout> {
            (field == RHO).then_some(FieldLayout::of::<f64>(1))
        }
        fn field_bytes(&self, field: FieldId) -> Option<&[u8]> {
            (field == RHO).then(|| bytemuck::cast_slice(&self.rho))
        }
        fn field_bytes_mut(&mut self, field: FieldId) -> Option<&mut [u8]> {
            (field == RHO).then(|| bytemuck::cast_slice_mut(&mut self.rho))
        }
    }

    fn serial_grid(dims: [u32; 3]) -> Grid<Scalar, NoComm> {
        Grid::new(
            NoComm,
            GridConfig {
                dims,
                ..GridConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn serial_grid_owns_everything() {
        let grid = serial_grid([4, 3, 2]);
        assert_eq!(grid.cells().count(), 24);
        assert_eq!(grid.remote_cells().count(), 0);
        assert_eq!(grid.boundary_cells().count(), 0);
        assert_eq!(grid.inner_cells().count(), 24);
        grid.directory().validate_cover(24).unwrap();
    }

    #[test]
    fn serial_halo_round_is_a_no_op() {
        let mut grid = serial_grid([2, 2, 2]);
        grid.start_exchange(RHO).unwrap();
        grid.wait_all().unwrap();
    }

    #[test]
    fn payload_access_is_ownership_transparent() {
        let mut grid = serial_grid([2, 2, 2]);
        let id = CellId::new(3);
        grid.payload_mut(id).unwrap().rho[0] = 2.5;
        assert_eq!(grid.payload(id).unwrap().rho[0], 2.5);
        assert!(grid.payload(CellId::new(99)).is_none());
    }

    #[test]
    fn neighbors_follow_topology_for_local_cells() {
        let grid = serial_grid([4, 4, 4]);
        let topo = grid.topology();
        let id = topo.index([1, 1, 1]);
        let nbrs = grid.neighbors(id).unwrap();
        assert_eq!(nbrs[0], Some(topo.index([0, 1, 1])));
        assert_eq!(grid.neighbors(CellId::new(999)), None);
    }

    #[test]
    fn coordinate_accessors_resolve_local_cells() {
        let grid = serial_grid([2, 1, 1]);
        assert_eq!(grid.cell_corner(CellId::new(1)), Some([0.5, 0.0, 0.0]));
        assert_eq!(grid.cell_center(CellId::new(0)), Some([0.25, 0.5, 0.5]));
        assert_eq!(grid.cell_size(), [0.5, 1.0, 1.0]);
    }

    #[test]
    fn set_periodic_rebuilds_neighbor_lists() {
        let mut grid = serial_grid([4, 1, 1]);
        assert_eq!(grid.neighbors(CellId::new(0)).unwrap()[0], None);
        grid.set_periodic(Axis::X, true).unwrap();
        assert_eq!(
            grid.neighbors(CellId::new(0)).unwrap()[0],
            Some(CellId::new(3))
        );
        // Single owner: still nothing to exchange.
        assert_eq!(grid.exchange_lists().send_len(), 0);
    }
}
