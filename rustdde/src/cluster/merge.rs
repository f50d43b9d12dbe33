//! Merging of clusters whose centroids fall within a distance threshold.

use denscore::grid::lattice::Grid3D;
use denscore::grid::partitioning::Partitioning;

use crate::cluster::cluster::{annotate_event_masks, ClusteringConfig, DensityCluster};

/// Union clusters whose centroids lie within `merge_distance` of each other,
/// repeating until no pair qualifies, so the operation is idempotent: a
/// merged set run through the same threshold again comes back unchanged.
///
/// Merged clusters get their centroid, peak, event mask and overlap counts
/// recomputed from the combined voxel set.
pub fn merge_clusters(
    clusters: Vec<DensityCluster>,
    merge_distance: f64,
    grid: &Grid3D,
    partitioning: &Partitioning,
    config: &ClusteringConfig,
) -> Vec<DensityCluster> {
    let mut merged = clusters;
    loop {
        let Some((a, b)) = closest_pair_within(&merged, merge_distance) else {
            break;
        };
        let second = merged.remove(b);
        let first = merged.remove(a);
        let mut members: Vec<(usize, f32)> = first
            .indices
            .iter()
            .copied()
            .zip(first.values.iter().copied())
            .chain(second.indices.iter().copied().zip(second.values.iter().copied()))
            .collect();
        members.sort_by_key(|&(idx, _)| idx);
        let mut combined = vec![DensityCluster::from_members(grid, members)];
        annotate_event_masks(&mut combined, grid, partitioning, config);
        merged.insert(a, combined.remove(0));
    }
    merged
}

/// First pair (by index order) of distinct clusters closer than the cutoff.
fn closest_pair_within(clusters: &[DensityCluster], cutoff: f64) -> Option<(usize, usize)> {
    for a in 0..clusters.len() {
        for b in (a + 1)..clusters.len() {
            let d = (clusters[a].centroid_point() - clusters[b].centroid_point()).norm();
            if d < cutoff {
                return Some((a, b));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use denscore::grid::partitioning::MaskConfig;
    use nalgebra::Point3;

    fn fixture() -> (Grid3D, Partitioning) {
        let grid = Grid3D::new([12, 12, 12], 1.0, [0.0; 3]);
        let part = Partitioning::from_atoms(
            &grid,
            &[Point3::new(6.0, 6.0, 6.0)],
            &[],
            &MaskConfig {
                outer_mask: 12.0,
                ..MaskConfig::default()
            },
        );
        (grid, part)
    }

    fn blob(grid: &Grid3D, at: [usize; 3], z: f32) -> DensityCluster {
        DensityCluster::from_members(grid, vec![(grid.index(at[0], at[1], at[2]), z)])
    }

    #[test]
    fn test_close_clusters_merge() {
        let (grid, part) = fixture();
        let cfg = ClusteringConfig::default();
        let clusters = vec![
            blob(&grid, [5, 5, 5], 4.0),
            blob(&grid, [6, 5, 5], 5.0),
            blob(&grid, [11, 11, 11], 4.0),
        ];
        let merged = merge_clusters(clusters, 3.0, &grid, &part, &cfg);
        assert_eq!(merged.len(), 2);
        let big = merged.iter().find(|c| c.size() == 2).unwrap();
        assert_eq!(big.peak_z, 5.0);
        assert!(!big.event_mask_indices.is_empty());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (grid, part) = fixture();
        let cfg = ClusteringConfig::default();
        let clusters = vec![
            blob(&grid, [4, 4, 4], 4.0),
            blob(&grid, [5, 4, 4], 4.5),
            blob(&grid, [6, 4, 4], 3.5),
            blob(&grid, [10, 10, 10], 4.0),
        ];
        let once = merge_clusters(clusters, 2.5, &grid, &part, &cfg);
        let twice = merge_clusters(once.clone(), 2.5, &grid, &part, &cfg);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.indices, b.indices);
            assert_eq!(a.centroid, b.centroid);
        }
    }

    #[test]
    fn test_merge_empty_is_empty() {
        let (grid, part) = fixture();
        let cfg = ClusteringConfig::default();
        let merged = merge_clusters(Vec::new(), 3.0, &grid, &part, &cfg);
        assert!(merged.is_empty());
    }
}
