//! Replicated directory of cell ownership.
//!
//! The directory maps every global cell id to the rank that owns it and is
//! kept byte-identical on every process: after any ownership change it is
//! rebuilt wholesale from an all-gather of the per-rank local id lists,
//! never patched cell-by-cell across processes.

use std::collections::HashMap;
use std::ops::Range;

use log::debug;

use crate::algs::communicator::Communicator;
use crate::algs::gather::{GatherTags, all_gather_bytes};
use crate::grid_error::GridError;
use crate::topology::CellId;

/// Balanced contiguous id range for one rank: `n_total` cells over
/// `n_procs` ranks, counts differing by at most one, remainder going to the
/// lowest-numbered ranks.
pub fn initial_range(n_total: u64, n_procs: usize, rank: usize) -> Range<u64> {
    debug_assert!(rank < n_procs);
    let p = n_procs as u64;
    let r = rank as u64;
    let quot = n_total / p;
    let rem = n_total % p;
    let start = r * quot + r.min(rem);
    let len = quot + u64::from(r < rem);
    start..start + len
}

/// Replicated mapping from global cell id to owning rank.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    owners: HashMap<CellId, usize>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner rank of `id`, if the directory knows the cell.
    #[inline]
    pub fn owner(&self, id: CellId) -> Option<usize> {
        self.owners.get(&id).copied()
    }

    /// Number of cells the directory covers.
    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Record `id` as owned by `rank`. Local edit only; cross-process
    /// consistency is re-established by the next [`Directory::sync`].
    pub fn insert(&mut self, id: CellId, rank: usize) {
        self.owners.insert(id, rank);
    }

    /// Forget the owner of `id`. Local edit only, see [`Directory::insert`].
    pub fn remove(&mut self, id: CellId) {
        self.owners.remove(&id);
    }

    /// Number of cells owned by each rank in `0..n_procs`.
    pub fn counts_per_rank(&self, n_procs: usize) -> Vec<usize> {
        let mut counts = vec![0usize; n_procs];
        for &rank in self.owners.values() {
            counts[rank] += 1;
        }
        counts
    }

    /// Rebuild the directory from every rank's local id list (collective).
    ///
    /// Every rank must call this in the same order with the same `epoch`;
    /// the call blocks until the slowest participant's contribution arrives.
    pub fn sync<C: Communicator>(
        &mut self,
        comm: &C,
        local_ids: &[CellId],
        epoch: u32,
    ) -> Result<(), GridError> {
        let blobs = all_gather_bytes(
            comm,
            bytemuck::cast_slice(local_ids),
            GatherTags::for_epoch(epoch),
        )?;
        self.owners.clear();
        for (rank, blob) in blobs.iter().enumerate() {
            for &id in bytemuck::cast_slice::<u8, CellId>(blob) {
                self.owners.insert(id, rank);
            }
        }
        debug!(
            "rank {}: directory rebuilt, {} cells over {} ranks (epoch {epoch})",
            comm.rank(),
            self.owners.len(),
            comm.size()
        );
        Ok(())
    }

    /// Verify the disjoint-cover invariant: every id in `[0, n_total)` is
    /// owned by exactly one rank.
    pub fn validate_cover(&self, n_total: u64) -> Result<(), GridError> {
        if self.owners.len() as u64 != n_total {
            return Err(GridError::DirectoryIncomplete {
                expected: n_total,
                got: self.owners.len() as u64,
            });
        }
        for raw in 0..n_total {
            if !self.owners.contains_key(&CellId::new(raw)) {
                return Err(GridError::DirectoryMiss(CellId::new(raw)));
            }
        }
        Ok(())
    }
}
