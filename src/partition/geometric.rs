//! Geometric assignment strategies: Block, Random, RCB, RIB, HSFC.
//!
//! Every function maps the census order (cells sorted by id) to a part
//! index, deterministically. Geometric strategies read coordinates through
//! the callback contract; Block and Random need only the census itself.

use std::cmp::Ordering;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::directory::initial_range;
use crate::partition::PartitionCallbacks;
use crate::topology::CellId;

pub(crate) fn range_len(n: u64, parts: usize, rank: usize) -> usize {
    let r = initial_range(n, parts, rank);
    (r.end - r.start) as usize
}

/// Contiguous blocks of the census order, balanced to within one cell.
pub fn block_assignment(n: usize, n_parts: usize) -> Vec<usize> {
    let mut out = vec![0usize; n];
    for part in 0..n_parts {
        for raw in initial_range(n as u64, n_parts, part) {
            out[raw as usize] = part;
        }
    }
    out
}

/// Seeded shuffle of the census order, then blocks. Reproducible per seed.
pub fn random_assignment(n: usize, n_parts: usize, seed: u64) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..n).collect();
    let mut rng = SmallRng::seed_from_u64(seed);
    perm.shuffle(&mut rng);
    let blocks = block_assignment(n, n_parts);
    let mut out = vec![0usize; n];
    for (shuffled_pos, &cell_pos) in perm.iter().enumerate() {
        out[cell_pos] = blocks[shuffled_pos];
    }
    out
}

/// Recursive coordinate bisection: split at the median of the longest axis.
pub fn rcb_assignment<CB: PartitionCallbacks>(
    cb: &CB,
    ids: &[CellId],
    n_parts: usize,
) -> Vec<usize> {
    let coords: Vec<[f64; 3]> = ids.iter().map(|&id| cb.coordinates(id)).collect();
    let mut out = vec![0usize; ids.len()];
    let mut items: Vec<usize> = (0..ids.len()).collect();
    bisect(&coords, &mut items, 0, n_parts, &mut out, longest_axis);
    out
}

/// Recursive inertial bisection: split at the median along the principal
/// inertia axis of the point set.
pub fn rib_assignment<CB: PartitionCallbacks>(
    cb: &CB,
    ids: &[CellId],
    n_parts: usize,
) -> Vec<usize> {
    let coords: Vec<[f64; 3]> = ids.iter().map(|&id| cb.coordinates(id)).collect();
    let mut out = vec![0usize; ids.len()];
    let mut items: Vec<usize> = (0..ids.len()).collect();
    bisect(&coords, &mut items, 0, n_parts, &mut out, principal_axis);
    out
}

fn bisect(
    coords: &[[f64; 3]],
    items: &mut [usize],
    first_part: usize,
    n_parts: usize,
    out: &mut [usize],
    direction: fn(&[[f64; 3]], &[usize]) -> [f64; 3],
) {
    if n_parts == 1 {
        for &i in items.iter() {
            out[i] = first_part;
        }
        return;
    }
    let p_left = n_parts / 2;
    let dir = direction(coords, items);
    items.sort_by(|&a, &b| {
        dot(coords[a], dir)
            .partial_cmp(&dot(coords[b], dir))
            .unwrap_or(Ordering::Equal)
    });
    let m_left = items.len() * p_left / n_parts;
    let (left, right) = items.split_at_mut(m_left);
    bisect(coords, left, first_part, p_left, out, direction);
    bisect(
        coords,
        right,
        first_part + p_left,
        n_parts - p_left,
        out,
        direction,
    );
}

#[inline]
fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Unit vector of the axis with the largest extent over `items`.
fn longest_axis(coords: &[[f64; 3]], items: &[usize]) -> [f64; 3] {
    let mut best = 0;
    let mut best_extent = f64::NEG_INFINITY;
    for axis in 0..3 {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &i in items {
            lo = lo.min(coords[i][axis]);
            hi = hi.max(coords[i][axis]);
        }
        if hi - lo > best_extent {
            best_extent = hi - lo;
            best = axis;
        }
    }
    let mut dir = [0.0; 3];
    dir[best] = 1.0;
    dir
}

/// Dominant eigenvector of the covariance of `items`, via power iteration.
/// Falls back to the longest axis for degenerate point sets.
fn principal_axis(coords: &[[f64; 3]], items: &[usize]) -> [f64; 3] {
    let n = items.len() as f64;
    let mut mean = [0.0f64; 3];
    for &i in items {
        for a in 0..3 {
            mean[a] += coords[i][a];
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }

    let mut cov = [[0.0f64; 3]; 3];
    for &i in items {
        let d: [f64; 3] = std::array::from_fn(|a| coords[i][a] - mean[a]);
        for r in 0..3 {
            for c in 0..3 {
                cov[r][c] += d[r] * d[c];
            }
        }
    }

    // Non-axis-aligned start so an axis-aligned dominant direction is not
    // orthogonal to the initial guess.
    let mut v = [0.577, 0.651, 0.493];
    for _ in 0..32 {
        let w: [f64; 3] = std::array::from_fn(|r| dot(cov[r], v));
        let norm = dot(w, w).sqrt();
        if norm < 1e-12 {
            return longest_axis(coords, items);
        }
        v = w.map(|x| x / norm);
    }
    v
}

const HILBERT_BITS: u32 = 16;

/// Hilbert space-filling-curve ordering of the cells, then blocks.
pub fn hsfc_assignment<CB: PartitionCallbacks>(
    cb: &CB,
    ids: &[CellId],
    n_parts: usize,
) -> Vec<usize> {
    let coords: Vec<[f64; 3]> = ids.iter().map(|&id| cb.coordinates(id)).collect();
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for c in &coords {
        for a in 0..3 {
            lo[a] = lo[a].min(c[a]);
            hi[a] = hi[a].max(c[a]);
        }
    }
    let scale: [f64; 3] = std::array::from_fn(|a| {
        let extent = hi[a] - lo[a];
        if extent > 0.0 {
            ((1u64 << HILBERT_BITS) - 1) as f64 / extent
        } else {
            0.0
        }
    });

    let mut order: Vec<usize> = (0..ids.len()).collect();
    let keys: Vec<u64> = coords
        .iter()
        .map(|c| {
            let q: [u32; 3] = std::array::from_fn(|a| ((c[a] - lo[a]) * scale[a]) as u32);
            hilbert_key(q)
        })
        .collect();
    order.sort_by_key(|&i| (keys[i], i));

    let blocks = block_assignment(ids.len(), n_parts);
    let mut out = vec![0usize; ids.len()];
    for (curve_pos, &cell_pos) in order.iter().enumerate() {
        out[cell_pos] = blocks[curve_pos];
    }
    out
}

/// Distance along the 3D Hilbert curve for quantized axes (Skilling's
/// transpose-form algorithm, then bit interleave).
fn hilbert_key(axes: [u32; 3]) -> u64 {
    let mut x = axes;
    let n = 3;

    // Inverse undo excess work.
    let mut q = 1u32 << (HILBERT_BITS - 1);
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    // Gray encode.
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t = 0u32;
    q = 1 << (HILBERT_BITS - 1);
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for v in x.iter_mut() {
        *v ^= t;
    }

    // Interleave transposed bits, x-bit first, into one key.
    let mut key = 0u64;
    for bit in (0..HILBERT_BITS).rev() {
        for v in x {
            key = key << 1 | u64::from(v >> bit & 1);
        }
    }
    key
}
