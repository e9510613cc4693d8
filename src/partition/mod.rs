//! Partitioning backend: computes which cells should move between ranks.
//!
//! The backend consumes the callback contract in [`PartitionCallbacks`] and
//! produces import/export cell lists. All strategies are deterministic:
//! because cell coordinates and adjacency are derivable from the global id
//! and the replicated directory, every rank computes the same full
//! assignment without communication and derives its own lists from it.

pub mod geometric;
pub mod graph;

use std::fmt;

use hashbrown::HashMap;
use log::debug;

use crate::grid_error::GridError;
use crate::topology::CellId;

/// Load-balancing strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Strategy {
    /// Contiguous blocks of the sorted id range.
    Block,
    /// Seeded random shuffle, then blocks.
    Random,
    /// Recursive coordinate bisection on the longest axis.
    Rcb,
    /// Recursive inertial bisection on the principal axis.
    Rib,
    /// Hilbert space-filling-curve ordering, then blocks.
    Hsfc,
    /// Balanced greedy growth over the cell adjacency graph.
    Graph,
}

impl Strategy {
    /// Which callback data the strategy needs.
    pub fn required_data(self) -> Capability {
        match self {
            Strategy::Block | Strategy::Random => Capability::Trivial,
            Strategy::Rcb | Strategy::Rib | Strategy::Hsfc => Capability::Geometric,
            Strategy::Graph => Capability::Graph,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Block => "BLOCK",
            Strategy::Random => "RANDOM",
            Strategy::Rcb => "RCB",
            Strategy::Rib => "RIB",
            Strategy::Hsfc => "HSFC",
            Strategy::Graph => "GRAPH",
        };
        f.write_str(name)
    }
}

/// Callback data classes a strategy can require. Explicit tags; backends are
/// never probed by type introspection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Only the cell census.
    Trivial,
    /// Census plus per-cell 3D coordinates.
    Geometric,
    /// Census plus per-cell edges `(neighbor id, neighbor owner)`.
    Graph,
}

/// Callback contract the caller supplies to the backend. The directory
/// behind `census` and `edges` must be current when the backend runs.
pub trait PartitionCallbacks {
    /// Every cell of the domain with its current owner, sorted by id,
    /// identical on every rank (the replicated directory view).
    fn census(&self) -> Vec<(CellId, usize)>;
    /// Physical coordinates of one cell.
    fn coordinates(&self, id: CellId) -> [f64; 3];
    /// Number of graph edges of one cell.
    fn num_edges(&self, id: CellId) -> usize;
    /// Edges of one cell: `(neighbor id, neighbor owner rank)`.
    fn edges(&self, id: CellId) -> Vec<(CellId, usize)>;
}

/// Result of one backend invocation, from the calling rank's perspective.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionOutcome {
    /// Cells newly assigned to this rank that it does not yet own.
    pub imports: Vec<CellId>,
    /// Owned cells assigned elsewhere, with their destination rank.
    pub exports: Vec<(CellId, usize)>,
}

/// Native partitioner implementing all [`Strategy`] variants.
#[derive(Clone, Debug)]
pub struct NativePartitioner {
    seed: u64,
}

impl NativePartitioner {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Compute the import/export lists for `my_rank` under `strategy`.
    ///
    /// On error the caller's directory is untouched; the caller decides
    /// whether to abort or retry with a different strategy.
    pub fn partition<CB: PartitionCallbacks>(
        &self,
        cb: &CB,
        strategy: Strategy,
        n_parts: usize,
        my_rank: usize,
    ) -> Result<PartitionOutcome, GridError> {
        if n_parts == 0 || my_rank >= n_parts {
            return Err(GridError::Partition {
                strategy,
                reason: format!("rank {my_rank} outside group of {n_parts}"),
            });
        }
        let census = cb.census();
        if census.is_empty() {
            return Err(GridError::Partition {
                strategy,
                reason: "empty cell census".into(),
            });
        }
        debug_assert!(census.windows(2).all(|w| w[0].0 < w[1].0));

        let ids: Vec<CellId> = census.iter().map(|&(id, _)| id).collect();
        let assignment = match strategy {
            Strategy::Block => geometric::block_assignment(ids.len(), n_parts),
            Strategy::Random => geometric::random_assignment(ids.len(), n_parts, self.seed),
            Strategy::Rcb => geometric::rcb_assignment(cb, &ids, n_parts),
            Strategy::Rib => geometric::rib_assignment(cb, &ids, n_parts),
            Strategy::Hsfc => geometric::hsfc_assignment(cb, &ids, n_parts),
            Strategy::Graph => graph::grow_assignment(cb, &ids, n_parts),
        };
        debug_assert_eq!(assignment.len(), ids.len());

        let mut outcome = PartitionOutcome::default();
        for (&(id, owner), &part) in census.iter().zip(assignment.iter()) {
            if owner == my_rank && part != my_rank {
                outcome.exports.push((id, part));
            } else if owner != my_rank && part == my_rank {
                outcome.imports.push(id);
            }
        }
        debug!(
            "{strategy} partition over {} cells: rank {my_rank} imports {}, exports {}",
            ids.len(),
            outcome.imports.len(),
            outcome.exports.len()
        );
        Ok(outcome)
    }
}

/// Index map used by the strategy implementations.
pub(crate) fn id_positions(ids: &[CellId]) -> HashMap<CellId, usize> {
    ids.iter().enumerate().map(|(i, &id)| (id, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::initial_range;
    use crate::topology::{BoundingBox, GridTopology};

    pub(crate) struct TopoCallbacks {
        pub topo: GridTopology,
        pub owners: Vec<usize>,
    }

    impl TopoCallbacks {
        pub fn balanced(dims: [u32; 3], n_parts: usize) -> Self {
            let topo = GridTopology::new(dims, BoundingBox::unit()).unwrap();
            let n = topo.n_total();
            let mut owners = vec![0usize; n as usize];
            for rank in 0..n_parts {
                for raw in initial_range(n, n_parts, rank) {
                    owners[raw as usize] = rank;
                }
            }
            Self { topo, owners }
        }
    }

    impl PartitionCallbacks for TopoCallbacks {
        fn census(&self) -> Vec<(CellId, usize)> {
            self.owners
                .iter()
                .enumerate()
                .map(|(raw, &rank)| (CellId::new(raw as u64), rank))
                .collect()
        }
        fn coordinates(&self, id: CellId) -> [f64; 3] {
            self.topo.corner(id)
        }
        fn num_edges(&self, id: CellId) -> usize {
            self.topo.neighbors(id).iter().flatten().count()
        }
        fn edges(&self, id: CellId) -> Vec<(CellId, usize)> {
            self.topo
                .neighbors(id)
                .into_iter()
                .flatten()
                .map(|nbr| (nbr, self.owners[nbr.get() as usize]))
                .collect()
        }
    }

    fn full_assignment(outcomes: &[PartitionOutcome], cb: &TopoCallbacks) -> Vec<usize> {
        let mut owners = cb.owners.clone();
        for (rank, outcome) in outcomes.iter().enumerate() {
            for &id in &outcome.imports {
                owners[id.get() as usize] = rank;
            }
            for &(id, dest) in &outcome.exports {
                assert_ne!(dest, rank);
                owners[id.get() as usize] = dest;
            }
        }
        owners
    }

    #[test]
    fn every_strategy_keeps_a_disjoint_cover() {
        for strategy in [
            Strategy::Block,
            Strategy::Random,
            Strategy::Rcb,
            Strategy::Rib,
            Strategy::Hsfc,
            Strategy::Graph,
        ] {
            let n_parts = 3;
            let cb = TopoCallbacks::balanced([4, 4, 2], n_parts);
            let backend = NativePartitioner::new(42);
            let outcomes: Vec<_> = (0..n_parts)
                .map(|rank| backend.partition(&cb, strategy, n_parts, rank).unwrap())
                .collect();
            let owners = full_assignment(&outcomes, &cb);
            let mut counts = vec![0usize; n_parts];
            for &o in &owners {
                assert!(o < n_parts, "{strategy}: rank {o} out of range");
                counts[o] += 1;
            }
            assert_eq!(counts.iter().sum::<usize>(), 32);
            assert!(
                counts.iter().all(|&c| c > 0),
                "{strategy}: empty part in {counts:?}"
            );
        }
    }

    #[test]
    fn block_is_the_identity_on_a_balanced_initial_split() {
        let cb = TopoCallbacks::balanced([4, 4, 2], 4);
        let backend = NativePartitioner::new(0);
        for rank in 0..4 {
            let outcome = backend.partition(&cb, Strategy::Block, 4, rank).unwrap();
            assert_eq!(outcome, PartitionOutcome::default());
        }
    }

    #[test]
    fn rcb_halves_a_cube_across_two_ranks() {
        let cb = TopoCallbacks::balanced([4, 4, 4], 2);
        let backend = NativePartitioner::new(0);
        let a = backend.partition(&cb, Strategy::Rcb, 2, 0).unwrap();
        let b = backend.partition(&cb, Strategy::Rcb, 2, 1).unwrap();
        let owners = full_assignment(&[a, b], &cb);
        let count0 = owners.iter().filter(|&&o| o == 0).count();
        assert_eq!(count0, 32);
        // One geometric half each: cells in a part share a half-space.
        let topo = &cb.topo;
        let split_axis = (0..3)
            .find(|&a| {
                (0..64).all(|raw| {
                    let ind = topo.indices(CellId::new(raw));
                    (ind[a] < 2) == (owners[raw as usize] == owners[0])
                })
            })
            .is_some();
        assert!(split_axis, "RCB did not produce an axis-aligned bisection");
    }

    #[test]
    fn random_is_deterministic_per_seed() {
        let cb = TopoCallbacks::balanced([4, 4, 2], 3);
        let a = NativePartitioner::new(7)
            .partition(&cb, Strategy::Random, 3, 1)
            .unwrap();
        let b = NativePartitioner::new(7)
            .partition(&cb, Strategy::Random, 3, 1)
            .unwrap();
        assert_eq!(a, b);
        let c = NativePartitioner::new(8)
            .partition(&cb, Strategy::Random, 3, 1)
            .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn capabilities_are_tagged_per_strategy() {
        assert_eq!(Strategy::Block.required_data(), Capability::Trivial);
        assert_eq!(Strategy::Hsfc.required_data(), Capability::Geometric);
        assert_eq!(Strategy::Graph.required_data(), Capability::Graph);
    }

    #[test]
    fn bad_group_shape_is_a_partition_error() {
        let cb = TopoCallbacks::balanced([2, 2, 1], 1);
        let backend = NativePartitioner::new(0);
        let err = backend.partition(&cb, Strategy::Block, 1, 3).unwrap_err();
        assert!(matches!(err, GridError::Partition { .. }));
    }
}
