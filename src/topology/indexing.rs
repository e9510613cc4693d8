//! Pure index arithmetic on the base (unrefined) 3D grid.
//!
//! `GridTopology` maps a dense global [`CellId`] to and from `(i,j,k)`
//! indices and computes cardinal-direction neighbor ids, honoring per-axis
//! periodicity. No side effects, no I/O. Out-of-range input is a
//! precondition violation and panics; it is never a recoverable error.

use crate::grid_error::GridError;
use crate::topology::cell::{CellId, NEIGHBOR_SLOTS};

/// One coordinate axis of the grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in storage order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Axis-aligned bounding box of the physical domain.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Unit cube `[0,1]^3`.
    pub fn unit() -> Self {
        Self {
            min: [0.0; 3],
            max: [1.0; 3],
        }
    }
}

/// Index arithmetic for a regular `nx × ny × nz` grid.
///
/// `index` and `indices` are bijections over `[0, n_total)` with the layout
/// `id = k*ny*nx + j*nx + i`.
#[derive(Clone, Debug)]
pub struct GridTopology {
    dims: [u32; 3],
    min: [f64; 3],
    spacing: [f64; 3],
    periodic: [bool; 3],
}

impl GridTopology {
    /// Create a topology for `dims` cells spanning `bounds`.
    pub fn new(dims: [u32; 3], bounds: BoundingBox) -> Result<Self, GridError> {
        if dims.iter().any(|&n| n == 0) {
            return Err(GridError::InvalidGeometry {
                dims,
                reason: "every axis needs at least one cell",
            });
        }
        if (0..3).any(|a| bounds.max[a] <= bounds.min[a]) {
            return Err(GridError::InvalidGeometry {
                dims,
                reason: "bounding box must have positive extent on every axis",
            });
        }
        let spacing = std::array::from_fn(|a| (bounds.max[a] - bounds.min[a]) / dims[a] as f64);
        Ok(Self {
            dims,
            min: bounds.min,
            spacing,
            periodic: [false; 3],
        })
    }

    /// Total number of cells in the grid.
    #[inline]
    pub fn n_total(&self) -> u64 {
        self.dims.iter().map(|&n| n as u64).product()
    }

    #[inline]
    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    /// Cell size per axis.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Set periodic wrap-around on one axis.
    pub fn set_periodic(&mut self, axis: Axis, on: bool) {
        self.periodic[axis.index()] = on;
    }

    #[inline]
    pub fn is_periodic(&self, axis: Axis) -> bool {
        self.periodic[axis.index()]
    }

    /// Map `(i,j,k)` to the dense global id.
    ///
    /// # Panics
    /// Panics if any index is outside its axis.
    #[inline]
    pub fn index(&self, ind: [u32; 3]) -> CellId {
        assert!(
            ind[0] < self.dims[0] && ind[1] < self.dims[1] && ind[2] < self.dims[2],
            "indices {ind:?} out of range for grid {:?}",
            self.dims
        );
        let [nx, ny, _] = self.dims.map(u64::from);
        CellId::new(ind[2] as u64 * ny * nx + ind[1] as u64 * nx + ind[0] as u64)
    }

    /// Map a dense global id back to `(i,j,k)`.
    ///
    /// # Panics
    /// Panics if `id >= n_total`.
    #[inline]
    pub fn indices(&self, id: CellId) -> [u32; 3] {
        assert!(
            id.get() < self.n_total(),
            "cell id {id} out of range for grid {:?}",
            self.dims
        );
        let [nx, ny, _] = self.dims.map(u64::from);
        let mut rest = id.get();
        let k = rest / (nx * ny);
        rest -= k * nx * ny;
        let j = rest / nx;
        let i = rest - j * nx;
        [i as u32, j as u32, k as u32]
    }

    /// Physical coordinates of the low corner of cell `id`.
    #[inline]
    pub fn corner(&self, id: CellId) -> [f64; 3] {
        let ind = self.indices(id);
        std::array::from_fn(|a| self.min[a] + ind[a] as f64 * self.spacing[a])
    }

    /// Physical coordinates of the center of cell `id`.
    #[inline]
    pub fn center(&self, id: CellId) -> [f64; 3] {
        let c = self.corner(id);
        std::array::from_fn(|a| c[a] + 0.5 * self.spacing[a])
    }

    /// Global ids of the six cardinal neighbors of `id`, ordered
    /// `(-x,+x,-y,+y,-z,+z)`.
    ///
    /// A slot is `None` when the neighbor would fall off a non-periodic
    /// domain edge; on a periodic axis the slot wraps to index `0`/`n-1`.
    pub fn neighbors(&self, id: CellId) -> [Option<CellId>; NEIGHBOR_SLOTS] {
        let ind = self.indices(id);
        let mut out = [None; NEIGHBOR_SLOTS];
        for a in 0..3 {
            let n = self.dims[a];
            let neg = if ind[a] == 0 {
                self.periodic[a].then(|| n - 1)
            } else {
                Some(ind[a] - 1)
            };
            let pos = if ind[a] == n - 1 {
                self.periodic[a].then_some(0)
            } else {
                Some(ind[a] + 1)
            };
            let mut shifted = ind;
            if let Some(v) = neg {
                shifted[a] = v;
                out[2 * a] = Some(self.index(shifted));
            }
            if let Some(v) = pos {
                shifted[a] = v;
                out[2 * a + 1] = Some(self.index(shifted));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn topo(dims: [u32; 3]) -> GridTopology {
        GridTopology::new(dims, BoundingBox::unit()).unwrap()
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(GridTopology::new([0, 4, 4], BoundingBox::unit()).is_err());
        let flat = BoundingBox {
            min: [0.0; 3],
            max: [1.0, 0.0, 1.0],
        };
        assert!(GridTopology::new([4, 4, 4], flat).is_err());
    }

    #[test]
    fn index_layout_matches_row_major_xyz() {
        let t = topo([4, 3, 2]);
        assert_eq!(t.index([0, 0, 0]).get(), 0);
        assert_eq!(t.index([1, 0, 0]).get(), 1);
        assert_eq!(t.index([0, 1, 0]).get(), 4);
        assert_eq!(t.index([0, 0, 1]).get(), 12);
        assert_eq!(t.index([3, 2, 1]).get(), 23);
    }

    #[test]
    fn neighbor_symmetry_non_periodic() {
        let t = topo([4, 4, 4]);
        let a = t.index([1, 1, 1]);
        let b = t.index([0, 1, 1]);
        assert_eq!(t.neighbors(a)[0], Some(b)); // -x
        assert_eq!(t.neighbors(b)[1], Some(a)); // +x
    }

    #[test]
    fn domain_edges_have_absent_neighbors() {
        let t = topo([4, 4, 4]);
        let origin = t.index([0, 0, 0]);
        let nbrs = t.neighbors(origin);
        assert_eq!(nbrs[0], None);
        assert_eq!(nbrs[2], None);
        assert_eq!(nbrs[4], None);
        assert_eq!(nbrs[1], Some(t.index([1, 0, 0])));
    }

    #[test]
    fn periodic_axis_wraps() {
        let mut t = topo([4, 4, 4]);
        t.set_periodic(Axis::X, true);
        let origin = t.index([0, 2, 2]);
        assert_eq!(t.neighbors(origin)[0], Some(t.index([3, 2, 2])));
        let edge = t.index([3, 2, 2]);
        assert_eq!(t.neighbors(edge)[1], Some(origin));
        // y stays clamped
        assert_eq!(t.neighbors(t.index([2, 0, 2]))[2], None);
    }

    #[test]
    fn center_offsets_corner_by_half_spacing() {
        let t = GridTopology::new(
            [2, 2, 2],
            BoundingBox {
                min: [0.0; 3],
                max: [2.0, 4.0, 8.0],
            },
        )
        .unwrap();
        let id = t.index([1, 1, 1]);
        assert_eq!(t.corner(id), [1.0, 2.0, 4.0]);
        assert_eq!(t.center(id), [1.5, 3.0, 6.0]);
    }

    proptest! {
        #[test]
        fn index_indices_roundtrip(
            nx in 1u32..24, ny in 1u32..24, nz in 1u32..24,
            seed in any::<u64>(),
        ) {
            let t = topo([nx, ny, nz]);
            let id = CellId::new(seed % t.n_total());
            let ind = t.indices(id);
            prop_assert_eq!(t.index(ind), id);
        }

        #[test]
        fn neighbor_symmetry_holds_everywhere(
            nx in 2u32..10, ny in 2u32..10, nz in 2u32..10,
            px in any::<bool>(), py in any::<bool>(), pz in any::<bool>(),
            seed in any::<u64>(),
        ) {
            let mut t = topo([nx, ny, nz]);
            t.set_periodic(Axis::X, px);
            t.set_periodic(Axis::Y, py);
            t.set_periodic(Axis::Z, pz);
            let id = CellId::new(seed % t.n_total());
            for (slot, nbr) in t.neighbors(id).into_iter().enumerate() {
                if let Some(nbr) = nbr {
                    let opposite = slot ^ 1;
                    prop_assert_eq!(t.neighbors(nbr)[opposite], Some(id));
                }
            }
        }
    }
}
