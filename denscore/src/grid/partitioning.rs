use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::grid::lattice::Grid3D;

/// Mask radii in Angstrom. All masks are stamped as spheres around the
/// supplied atom positions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaskConfig {
    /// Radius of the outer protein mask; voxels inside it are analysed.
    pub outer_mask: f64,
    /// Radius of the inner protein-core mask, used to penalise clusters
    /// that sit on top of modelled protein atoms.
    pub inner_mask: f64,
    /// Radius around symmetry-copy atoms; those voxels are kept in the
    /// total analysis mask but flagged separately.
    pub inner_mask_symmetry: f64,
    /// Radius of the protein contact shell used for cluster scoring.
    pub contact_mask_radius: f64,
}

impl Default for MaskConfig {
    fn default() -> Self {
        MaskConfig {
            outer_mask: 8.0,
            inner_mask: 2.0,
            inner_mask_symmetry: 2.0,
            contact_mask_radius: 4.0,
        }
    }
}

/// Boolean partition of the reference grid, shared read-only by every
/// component downstream of the alignment step.
///
/// `total_mask` (protein plus symmetry padding) defines the masked-voxel
/// ordering: `mask_indices` lists its linear indices ascending, and every
/// per-dataset masked array follows exactly that order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Partitioning {
    pub protein_mask: Vec<bool>,
    pub inner_mask: Vec<bool>,
    pub contact_mask: Vec<bool>,
    pub symmetry_mask: Vec<bool>,
    pub total_mask: Vec<bool>,
    pub mask_indices: Vec<usize>,
}

impl Partitioning {
    /// Build the partition from protein atom positions and (optionally)
    /// their symmetry copies.
    pub fn from_atoms(
        grid: &Grid3D,
        atoms: &[Point3<f64>],
        symmetry_atoms: &[Point3<f64>],
        config: &MaskConfig,
    ) -> Self {
        let n = grid.len();
        let mut protein_mask = vec![false; n];
        let mut inner_mask = vec![false; n];
        let mut contact_mask = vec![false; n];
        let mut symmetry_mask = vec![false; n];

        stamp_spheres(grid, atoms, config.outer_mask, &mut protein_mask);
        stamp_spheres(grid, atoms, config.inner_mask, &mut inner_mask);
        stamp_spheres(grid, atoms, config.contact_mask_radius, &mut contact_mask);
        stamp_spheres(
            grid,
            symmetry_atoms,
            config.inner_mask_symmetry,
            &mut symmetry_mask,
        );

        let total_mask: Vec<bool> = protein_mask
            .iter()
            .zip(symmetry_mask.iter())
            .map(|(&p, &s)| p || s)
            .collect();
        let mask_indices: Vec<usize> = total_mask
            .iter()
            .enumerate()
            .filter_map(|(idx, &m)| if m { Some(idx) } else { None })
            .collect();

        Partitioning {
            protein_mask,
            inner_mask,
            contact_mask,
            symmetry_mask,
            total_mask,
            mask_indices,
        }
    }

    /// Number of voxels in the total analysis mask.
    #[inline]
    pub fn num_masked(&self) -> usize {
        self.mask_indices.len()
    }

    /// Extract the masked values of a full-grid array, in `mask_indices`
    /// order.
    pub fn extract(&self, full: &[f32]) -> Vec<f32> {
        self.mask_indices.iter().map(|&idx| full[idx]).collect()
    }

    /// Scatter masked values back onto a zero-filled full-grid array.
    pub fn embed(&self, masked: &[f32], grid_len: usize) -> Vec<f32> {
        let mut full = vec![0.0f32; grid_len];
        for (&idx, &v) in self.mask_indices.iter().zip(masked.iter()) {
            full[idx] = v;
        }
        full
    }
}

fn stamp_spheres(grid: &Grid3D, centers: &[Point3<f64>], radius: f64, mask: &mut [bool]) {
    if radius <= 0.0 {
        return;
    }
    let r2 = radius * radius;
    let steps = (radius / grid.spacing).ceil() as i64;
    for center in centers {
        let ci = ((center.x - grid.origin[0]) / grid.spacing).round() as i64;
        let cj = ((center.y - grid.origin[1]) / grid.spacing).round() as i64;
        let ck = ((center.z - grid.origin[2]) / grid.spacing).round() as i64;
        for dk in -steps..=steps {
            for dj in -steps..=steps {
                for di in -steps..=steps {
                    let (i, j, k) = (ci + di, cj + dj, ck + dk);
                    if !grid.contains(i, j, k) {
                        continue;
                    }
                    let idx = grid.index(i as usize, j as usize, k as usize);
                    if mask[idx] {
                        continue;
                    }
                    let p = grid.position(idx);
                    let d = p - center;
                    if d.norm_squared() <= r2 {
                        mask[idx] = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> Grid3D {
        Grid3D::new([10, 10, 10], 1.0, [0.0; 3])
    }

    #[test]
    fn test_total_mask_is_union() {
        let grid = small_grid();
        let atoms = vec![Point3::new(2.0, 2.0, 2.0)];
        let sym = vec![Point3::new(8.0, 8.0, 8.0)];
        let part = Partitioning::from_atoms(&grid, &atoms, &sym, &MaskConfig::default());
        for idx in 0..grid.len() {
            assert_eq!(
                part.total_mask[idx],
                part.protein_mask[idx] || part.symmetry_mask[idx]
            );
        }
        assert_eq!(part.num_masked(), part.mask_indices.len());
    }

    #[test]
    fn test_inner_mask_subset_of_protein() {
        let grid = small_grid();
        let atoms = vec![Point3::new(5.0, 5.0, 5.0)];
        let part = Partitioning::from_atoms(&grid, &atoms, &[], &MaskConfig::default());
        for idx in 0..grid.len() {
            if part.inner_mask[idx] {
                assert!(part.protein_mask[idx]);
            }
        }
    }

    #[test]
    fn test_extract_embed_roundtrip() {
        let grid = small_grid();
        let atoms = vec![Point3::new(5.0, 5.0, 5.0)];
        let part = Partitioning::from_atoms(&grid, &atoms, &[], &MaskConfig::default());
        let mut full = vec![0.0f32; grid.len()];
        for (rank, &idx) in part.mask_indices.iter().enumerate() {
            full[idx] = rank as f32;
        }
        let masked = part.extract(&full);
        let back = part.embed(&masked, grid.len());
        assert_eq!(full, back);
    }
}
