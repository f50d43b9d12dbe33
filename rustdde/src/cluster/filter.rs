//! Size and peak filtering of primary clusters.
//!
//! Each stage returns a new collection so the run log can record the count
//! after every step.

use serde::{Deserialize, Serialize};

use denscore::grid::lattice::Grid3D;

use crate::cluster::cluster::DensityCluster;

/// Thresholds for discarding weak blobs.
///
/// Set a minimum to 0 to disable that bound.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobFilter {
    /// Minimum blob volume in cubic Angstrom.
    pub min_blob_volume: f64,
    /// Minimum |z| peak.
    pub min_blob_z_peak: f32,
}

impl Default for BlobFilter {
    fn default() -> Self {
        BlobFilter {
            min_blob_volume: 10.0,
            min_blob_z_peak: 3.0,
        }
    }
}

impl BlobFilter {
    #[inline]
    pub fn passes_size(&self, grid: &Grid3D, cluster: &DensityCluster) -> bool {
        cluster.volume(grid) >= self.min_blob_volume
    }

    #[inline]
    pub fn passes_peak(&self, cluster: &DensityCluster) -> bool {
        cluster.peak_z.abs() >= self.min_blob_z_peak
    }

    /// Keep clusters whose volume meets the minimum.
    pub fn filter_size(&self, grid: &Grid3D, clusters: &[DensityCluster]) -> Vec<DensityCluster> {
        clusters
            .iter()
            .filter(|c| self.passes_size(grid, c))
            .cloned()
            .collect()
    }

    /// Keep clusters whose |z| peak meets the minimum.
    pub fn filter_peak(&self, clusters: &[DensityCluster]) -> Vec<DensityCluster> {
        clusters
            .iter()
            .filter(|c| self.passes_peak(c))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_of(grid: &Grid3D, n: usize, peak: f32) -> DensityCluster {
        let members: Vec<(usize, f32)> = (0..n).map(|i| (i, peak)).collect();
        DensityCluster::from_members(grid, members)
    }

    #[test]
    fn test_size_filter() {
        let grid = Grid3D::new([10, 10, 10], 1.0, [0.0; 3]);
        let filter = BlobFilter::default();
        let clusters = vec![
            cluster_of(&grid, 5, 4.0),
            cluster_of(&grid, 15, 4.0),
            cluster_of(&grid, 30, 4.0),
        ];
        let kept = filter.filter_size(&grid, &clusters);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_size_filter_is_monotonic() {
        let grid = Grid3D::new([10, 10, 10], 1.0, [0.0; 3]);
        let clusters: Vec<DensityCluster> =
            (1..=20).map(|n| cluster_of(&grid, n, 4.0)).collect();
        let mut previous = usize::MAX;
        for min_volume in [0.0, 5.0, 10.0, 15.0, 25.0] {
            let filter = BlobFilter {
                min_blob_volume: min_volume,
                ..BlobFilter::default()
            };
            let kept = filter.filter_size(&grid, &clusters).len();
            assert!(kept <= previous);
            previous = kept;
        }
    }

    #[test]
    fn test_peak_filter_uses_absolute_value() {
        let grid = Grid3D::new([10, 10, 10], 1.0, [0.0; 3]);
        let filter = BlobFilter::default();
        let clusters = vec![cluster_of(&grid, 5, -4.0), cluster_of(&grid, 5, 2.0)];
        let kept = filter.filter_peak(&clusters);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].peak_z, -4.0);
    }
}
