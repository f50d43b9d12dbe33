//! Per-cluster signal/noise statistics.
//!
//! A blob of genuine ligand density sits against the protein surface
//! (contact shell) without being swallowed by modelled protein atoms
//! (inner mask); blobs dominated by the inner mask are protein motion, not
//! binding. These counts feed the best-cluster selection strategy and the
//! run log.

use serde::{Deserialize, Serialize};

use denscore::statistics::zmap::Zmap;

use crate::cluster::cluster::DensityCluster;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClusterStats {
    pub cluster_size: usize,
    /// Outlying voxels inside the dilated event mask.
    pub outer_hull_outliers: usize,
    pub protein_mask_size: usize,
    pub contact_mask_size: usize,
    /// contact overlap minus inner-protein overlap.
    pub signal: i64,
    /// Outliers around the blob that are not blob members, plus the
    /// inner-protein overlap.
    pub noise_with_protein: i64,
    pub noise_without_protein: i64,
    pub signal_to_noise: f64,
}

/// Score one annotated cluster against its Z-map at the given contour.
pub fn score_cluster(cluster: &DensityCluster, zmap: &Zmap, contour: f32) -> ClusterStats {
    let cluster_size = cluster.size();
    let outer_hull_outliers = cluster
        .event_mask_indices
        .iter()
        .filter(|&&idx| zmap.values[idx].abs() > contour)
        .count();
    let protein_mask_size = cluster.inner_protein_overlap;
    let contact_mask_size = cluster.contact_overlap;

    let signal = contact_mask_size as i64 - protein_mask_size as i64;
    let noise_without_protein = outer_hull_outliers as i64 - cluster_size as i64;
    let noise_with_protein = noise_without_protein + protein_mask_size as i64;
    let signal_to_noise = signal as f64 / (noise_with_protein + 1).max(1) as f64;

    ClusterStats {
        cluster_size,
        outer_hull_outliers,
        protein_mask_size,
        contact_mask_size,
        signal,
        noise_with_protein,
        noise_without_protein,
        signal_to_noise,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denscore::grid::lattice::Grid3D;

    #[test]
    fn test_contact_without_protein_scores_high() {
        let grid = Grid3D::new([6, 6, 6], 1.0, [0.0; 3]);
        let mut values = vec![0.0f32; grid.len()];
        let members = vec![(grid.index(2, 2, 2), 5.0f32), (grid.index(3, 2, 2), 5.0)];
        for &(idx, z) in &members {
            values[idx] = z;
        }
        let mut cluster = DensityCluster::from_members(&grid, members);
        cluster.event_mask_indices = cluster.indices.clone();
        cluster.contact_overlap = 2;
        cluster.inner_protein_overlap = 0;
        let zmap = Zmap {
            dtag: "t".to_string(),
            values,
        };
        let stats = score_cluster(&cluster, &zmap, 2.0);
        assert_eq!(stats.signal, 2);
        assert_eq!(stats.noise_without_protein, 0);
        assert!(stats.signal_to_noise > 1.0);
    }

    #[test]
    fn test_protein_dominated_cluster_scores_low() {
        let grid = Grid3D::new([6, 6, 6], 1.0, [0.0; 3]);
        let mut values = vec![0.0f32; grid.len()];
        let members = vec![(grid.index(2, 2, 2), 5.0f32)];
        values[grid.index(2, 2, 2)] = 5.0;
        let mut cluster = DensityCluster::from_members(&grid, members);
        cluster.event_mask_indices = cluster.indices.clone();
        cluster.contact_overlap = 1;
        cluster.inner_protein_overlap = 1;
        let zmap = Zmap {
            dtag: "t".to_string(),
            values,
        };
        let stats = score_cluster(&cluster, &zmap, 2.0);
        assert_eq!(stats.signal, 0);
        assert!(stats.signal_to_noise <= 0.0 + f64::EPSILON);
    }
}
