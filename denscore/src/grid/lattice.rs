use bincode::{Decode, Encode};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// The shared reference lattice every dataset is sampled onto.
///
/// Voxels are addressed either by `(i, j, k)` triples or by a linear index
/// with `i` fastest: `idx = (k * ny + j) * nx + i`. The lattice is
/// orthogonal with a uniform spacing; all real-space geometry (centroids,
/// cluster distances, site cutoffs) is derived from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Grid3D {
    /// Voxel counts along x, y, z.
    pub dims: [usize; 3],
    /// Voxel edge length in Angstrom.
    pub spacing: f64,
    /// Real-space coordinate of voxel (0, 0, 0).
    pub origin: [f64; 3],
}

impl Grid3D {
    pub fn new(dims: [usize; 3], spacing: f64, origin: [f64; 3]) -> Self {
        Grid3D { dims, spacing, origin }
    }

    /// Total number of voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    /// Inverse of `index`.
    #[inline]
    pub fn unravel(&self, idx: usize) -> [usize; 3] {
        let nx = self.dims[0];
        let ny = self.dims[1];
        let i = idx % nx;
        let j = (idx / nx) % ny;
        let k = idx / (nx * ny);
        [i, j, k]
    }

    #[inline]
    pub fn contains(&self, i: i64, j: i64, k: i64) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.dims[0]
            && (j as usize) < self.dims[1]
            && (k as usize) < self.dims[2]
    }

    /// Real-space position of a voxel centre.
    #[inline]
    pub fn position(&self, idx: usize) -> Point3<f64> {
        let [i, j, k] = self.unravel(idx);
        Point3::new(
            self.origin[0] + i as f64 * self.spacing,
            self.origin[1] + j as f64 * self.spacing,
            self.origin[2] + k as f64 * self.spacing,
        )
    }

    /// Volume of a single voxel in cubic Angstrom.
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.spacing * self.spacing * self.spacing
    }

    /// All non-zero voxel offsets `(di, dj, dk)` whose euclidean length in
    /// voxel steps is at most `max_steps`. Used for distance-cutoff
    /// clustering and for event-mask dilation; the list is ordered
    /// deterministically.
    pub fn neighbor_offsets(&self, max_steps: f64) -> Vec<(i64, i64, i64)> {
        let r = max_steps.floor() as i64;
        let limit2 = max_steps * max_steps;
        let mut offsets = Vec::new();
        for dk in -r..=r {
            for dj in -r..=r {
                for di in -r..=r {
                    if di == 0 && dj == 0 && dk == 0 {
                        continue;
                    }
                    let d2 = (di * di + dj * dj + dk * dk) as f64;
                    if d2 <= limit2 {
                        offsets.push((di, dj, dk));
                    }
                }
            }
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        let grid = Grid3D::new([4, 5, 6], 0.5, [0.0, 0.0, 0.0]);
        for idx in 0..grid.len() {
            let [i, j, k] = grid.unravel(idx);
            assert_eq!(grid.index(i, j, k), idx);
        }
    }

    #[test]
    fn test_position_uses_origin_and_spacing() {
        let grid = Grid3D::new([4, 4, 4], 2.0, [1.0, -1.0, 0.5]);
        let p = grid.position(grid.index(1, 2, 3));
        assert_eq!(p, Point3::new(3.0, 3.0, 6.5));
    }

    #[test]
    fn test_neighbor_offsets_cutoffs() {
        let grid = Grid3D::new([4, 4, 4], 1.0, [0.0; 3]);
        // faces only
        assert_eq!(grid.neighbor_offsets(1.0).len(), 6);
        // faces + edges
        assert_eq!(grid.neighbor_offsets(1.5).len(), 18);
        // full 3x3x3 shell
        assert_eq!(grid.neighbor_offsets(1.8).len(), 26);
    }
}
