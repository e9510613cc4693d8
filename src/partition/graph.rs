//! Graph assignment strategy: balanced greedy growth over the cell
//! adjacency graph.
//!
//! Parts are grown one at a time by breadth-first search from the
//! lowest-numbered unassigned cell, up to a balanced target size. Fully
//! deterministic: seeds and neighbor visitation are in id order.

use std::collections::VecDeque;

use crate::partition::geometric::range_len;
use crate::partition::{PartitionCallbacks, id_positions};
use crate::topology::CellId;

/// Assign each census position a part by balanced greedy graph growing.
pub fn grow_assignment<CB: PartitionCallbacks>(
    cb: &CB,
    ids: &[CellId],
    n_parts: usize,
) -> Vec<usize> {
    const UNASSIGNED: usize = usize::MAX;
    let n = ids.len();
    let pos = id_positions(ids);
    let mut out = vec![UNASSIGNED; n];
    let mut next_seed = 0usize;

    for part in 0..n_parts {
        let mut remaining = range_len(n as u64, n_parts, part);
        let mut queue: VecDeque<usize> = VecDeque::new();
        while remaining > 0 {
            let idx = match queue.pop_front() {
                Some(idx) => idx,
                None => {
                    while next_seed < n && out[next_seed] != UNASSIGNED {
                        next_seed += 1;
                    }
                    if next_seed == n {
                        break;
                    }
                    next_seed
                }
            };
            if out[idx] != UNASSIGNED {
                continue;
            }
            out[idx] = part;
            remaining -= 1;

            let mut frontier = Vec::with_capacity(cb.num_edges(ids[idx]));
            for (nbr, _owner) in cb.edges(ids[idx]) {
                if let Some(&nbr_idx) = pos.get(&nbr) {
                    if out[nbr_idx] == UNASSIGNED {
                        frontier.push(nbr_idx);
                    }
                }
            }
            frontier.sort_unstable();
            queue.extend(frontier);
        }
    }

    // Disconnected leftovers land in the last part.
    for slot in out.iter_mut() {
        if *slot == UNASSIGNED {
            *slot = n_parts - 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionCallbacks;
    use crate::topology::{BoundingBox, GridTopology};

    struct LineCallbacks(GridTopology);

    impl PartitionCallbacks for LineCallbacks {
        fn census(&self) -> Vec<(CellId, usize)> {
            (0..self.0.n_total()).map(|r| (CellId::new(r), 0)).collect()
        }
        fn coordinates(&self, id: CellId) -> [f64; 3] {
            self.0.corner(id)
        }
        fn num_edges(&self, id: CellId) -> usize {
            self.0.neighbors(id).iter().flatten().count()
        }
        fn edges(&self, id: CellId) -> Vec<(CellId, usize)> {
            self.0
                .neighbors(id)
                .into_iter()
                .flatten()
                .map(|nbr| (nbr, 0))
                .collect()
        }
    }

    #[test]
    fn growth_on_a_line_yields_contiguous_parts() {
        let cb = LineCallbacks(GridTopology::new([9, 1, 1], BoundingBox::unit()).unwrap());
        let ids: Vec<CellId> = (0..9).map(CellId::new).collect();
        let out = grow_assignment(&cb, &ids, 3);
        assert_eq!(out, vec![0, 0, 0, 1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn parts_hit_balanced_targets() {
        let cb = LineCallbacks(GridTopology::new([4, 4, 1], BoundingBox::unit()).unwrap());
        let ids: Vec<CellId> = (0..16).map(CellId::new).collect();
        let out = grow_assignment(&cb, &ids, 3);
        let mut counts = [0usize; 3];
        for &p in &out {
            counts[p] += 1;
        }
        assert_eq!(counts.iter().sum::<usize>(), 16);
        assert!(counts.iter().all(|&c| (5..=6).contains(&c)), "{counts:?}");
    }
}
