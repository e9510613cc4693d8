//! Exchange-list construction: derive, from the directory and each local
//! cell's neighbor slots, the per-process send and receive lists and the
//! inner/boundary classification of every local cell.
//!
//! Lists are rebuilt wholesale whenever the directory changes; stale entries
//! would reference ownership that no longer holds.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::debug;

use crate::directory::Directory;
use crate::grid_error::GridError;
use crate::topology::{Cell, CellId};

/// Send and receive lists for one directory generation.
///
/// The send list holds `(local cell, destination rank)` pairs; the receive
/// list maps each remote cell to the rank that will send it. Both iterate in
/// deterministic id order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeLists {
    send: BTreeSet<(CellId, usize)>,
    recv: BTreeMap<CellId, usize>,
}

impl ExchangeLists {
    /// Walk every local cell's neighbor slots against `directory`, filling
    /// the lists and setting each cell's boundary flag.
    ///
    /// Linear in `|local| * 6`. Fails with [`GridError::DirectoryMiss`] if a
    /// live neighbor has no owner recorded, which means the directory was
    /// not rebuilt after the last ownership change.
    pub fn build<P>(
        local: &mut BTreeMap<CellId, Cell<P>>,
        directory: &Directory,
        my_rank: usize,
    ) -> Result<Self, GridError> {
        let mut lists = Self::default();
        for (&id, cell) in local.iter_mut() {
            let mut has_remote = false;
            for nbr in cell.neighbors.into_iter().flatten() {
                let owner = directory.owner(nbr).ok_or(GridError::DirectoryMiss(nbr))?;
                if owner == my_rank {
                    continue;
                }
                has_remote = true;
                lists.send.insert((id, owner));
                lists.recv.insert(nbr, owner);
            }
            cell.boundary = has_remote;
        }
        debug!(
            "rank {my_rank}: exchange lists built, {} sends, {} recvs, peers {:?}",
            lists.send.len(),
            lists.recv.len(),
            lists.neighbor_ranks().collect::<Vec<_>>()
        );
        Ok(lists)
    }

    /// `(local cell, destination rank)` pairs in id order.
    pub fn send_iter(&self) -> impl Iterator<Item = (CellId, usize)> + '_ {
        self.send.iter().copied()
    }

    /// `(remote cell, source rank)` pairs in id order.
    pub fn recv_iter(&self) -> impl Iterator<Item = (CellId, usize)> + '_ {
        self.recv.iter().map(|(&id, &src)| (id, src))
    }

    /// Source rank for a remote cell, if it is on the receive list.
    pub fn recv_source(&self, id: CellId) -> Option<usize> {
        self.recv.get(&id).copied()
    }

    /// True iff `id` is on the receive list.
    pub fn expects(&self, id: CellId) -> bool {
        self.recv.contains_key(&id)
    }

    pub fn send_len(&self) -> usize {
        self.send.len()
    }

    pub fn recv_len(&self) -> usize {
        self.recv.len()
    }

    /// Ranks this process exchanges data with, deduplicated.
    pub fn neighbor_ranks(&self) -> impl Iterator<Item = usize> + '_ {
        self.send
            .iter()
            .map(|&(_, dest)| dest)
            .chain(self.recv.values().copied())
            .sorted_unstable()
            .dedup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{BoundingBox, GridTopology};

    /// 4x1x1 line owned by rank 0 as cells 0..2 and rank 1 as cells 2..4.
    fn split_line() -> (BTreeMap<CellId, Cell<()>>, Directory, GridTopology) {
        let topo = GridTopology::new([4, 1, 1], BoundingBox::unit()).unwrap();
        let mut local = BTreeMap::new();
        for raw in 0..2 {
            let id = CellId::new(raw);
            local.insert(id, Cell::at(&topo, id));
        }
        let mut dir = Directory::new();
        for raw in 0..4 {
            dir.insert(CellId::new(raw), usize::from(raw >= 2));
        }
        (local, dir, topo)
    }

    #[test]
    fn boundary_and_lists_for_two_rank_split() {
        let (mut local, dir, _topo) = split_line();
        let lists = ExchangeLists::build(&mut local, &dir, 0).unwrap();

        // Cell 1 borders cell 2 on rank 1; cell 0 is inner.
        assert!(!local[&CellId::new(0)].boundary);
        assert!(local[&CellId::new(1)].boundary);
        assert_eq!(
            lists.send_iter().collect::<Vec<_>>(),
            vec![(CellId::new(1), 1)]
        );
        assert_eq!(
            lists.recv_iter().collect::<Vec<_>>(),
            vec![(CellId::new(2), 1)]
        );
        assert_eq!(lists.neighbor_ranks().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn single_owner_grid_has_empty_lists() {
        let topo = GridTopology::new([3, 3, 1], BoundingBox::unit()).unwrap();
        let mut local = BTreeMap::new();
        let mut dir = Directory::new();
        for raw in 0..topo.n_total() {
            let id = CellId::new(raw);
            local.insert(id, Cell::<()>::at(&topo, id));
            dir.insert(id, 0);
        }
        let lists = ExchangeLists::build(&mut local, &dir, 0).unwrap();
        assert_eq!(lists.send_len(), 0);
        assert_eq!(lists.recv_len(), 0);
        assert!(local.values().all(|c| !c.boundary));
    }

    #[test]
    fn stale_directory_is_an_error() {
        let (mut local, mut dir, _topo) = split_line();
        dir.remove(CellId::new(2));
        let err = ExchangeLists::build(&mut local, &dir, 0).unwrap_err();
        assert!(matches!(err, GridError::DirectoryMiss(id) if id == CellId::new(2)));
    }

    #[test]
    fn rebuild_reflects_new_ownership() {
        let (mut local, mut dir, _topo) = split_line();
        // Rank 0 takes over the whole line: nothing left to exchange.
        for raw in 0..4 {
            dir.insert(CellId::new(raw), 0);
        }
        local.insert(CellId::new(2), {
            let topo = GridTopology::new([4, 1, 1], BoundingBox::unit()).unwrap();
            Cell::at(&topo, CellId::new(2))
        });
        local.insert(CellId::new(3), {
            let topo = GridTopology::new([4, 1, 1], BoundingBox::unit()).unwrap();
            Cell::at(&topo, CellId::new(3))
        });
        let lists = ExchangeLists::build(&mut local, &dir, 0).unwrap();
        assert_eq!(lists, ExchangeLists::default());
        assert!(local.values().all(|c| !c.boundary));
    }
}
