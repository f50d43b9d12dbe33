//! Primary clustering of Z-map outliers into spatially contiguous blobs.

use std::collections::VecDeque;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use denscore::grid::lattice::Grid3D;
use denscore::grid::partitioning::Partitioning;
use denscore::statistics::zmap::Zmap;

/// Parameters of the primary clustering stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// |z| contour above which a voxel counts as outlying.
    pub contour_level: f32,
    /// Linkage cutoff in units of the grid spacing; voxels closer than
    /// `multiplier * spacing` belong to the same blob.
    pub cluster_cutoff_distance_multiplier: f64,
    /// Dilation radius (Angstrom) of the event-mask footprint.
    pub event_mask_radius: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            contour_level: 2.5,
            cluster_cutoff_distance_multiplier: 1.5,
            event_mask_radius: 2.0,
        }
    }
}

/// One contiguous blob of outlying Z-map density.
///
/// `indices`/`values` are the member voxels (ascending linear index) and
/// their Z-scores. The event mask and the protein/contact overlap counts
/// are filled by [`annotate_event_masks`] once a cluster has survived the
/// size and peak filters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DensityCluster {
    pub indices: Vec<usize>,
    pub values: Vec<f32>,
    /// |z|-weighted real-space centroid.
    pub centroid: [f64; 3],
    pub peak_z: f32,
    /// Dilated voxel footprint used for scoring; empty until annotated.
    pub event_mask_indices: Vec<usize>,
    /// Member voxels that fall inside the inner protein mask.
    pub inner_protein_overlap: usize,
    /// Member voxels that fall inside the protein contact shell.
    pub contact_overlap: usize,
}

impl DensityCluster {
    /// Build a cluster from its member voxels, computing centroid and peak.
    pub fn from_members(grid: &Grid3D, mut members: Vec<(usize, f32)>) -> Self {
        members.sort_by_key(|&(idx, _)| idx);
        members.dedup_by_key(|&mut (idx, _)| idx);

        let mut weight_sum = 0.0f64;
        let mut acc = [0.0f64; 3];
        let mut peak = 0.0f32;
        for &(idx, z) in &members {
            let w = (z.abs() as f64).max(1e-12);
            let p = grid.position(idx);
            acc[0] += w * p.x;
            acc[1] += w * p.y;
            acc[2] += w * p.z;
            weight_sum += w;
            if z.abs() > peak.abs() {
                peak = z;
            }
        }
        let centroid = if weight_sum > 0.0 {
            [acc[0] / weight_sum, acc[1] / weight_sum, acc[2] / weight_sum]
        } else {
            [0.0; 3]
        };

        let (indices, values): (Vec<usize>, Vec<f32>) = members.into_iter().unzip();
        DensityCluster {
            indices,
            values,
            centroid,
            peak_z: peak,
            event_mask_indices: Vec::new(),
            inner_protein_overlap: 0,
            contact_overlap: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.indices.len()
    }

    /// Blob volume in cubic Angstrom.
    #[inline]
    pub fn volume(&self, grid: &Grid3D) -> f64 {
        self.indices.len() as f64 * grid.voxel_volume()
    }

    #[inline]
    pub fn centroid_point(&self) -> Point3<f64> {
        Point3::new(self.centroid[0], self.centroid[1], self.centroid[2])
    }
}

/// Group the above-contour voxels of a Z-map into clusters.
///
/// Voxels are connected when their grid offset is within the linkage cutoff
/// `cluster_cutoff_distance_multiplier * spacing`; components are grown
/// breadth-first from the lowest linear index, so the output order is
/// deterministic. Only voxels inside the total analysis mask participate.
/// An all-quiet Z-map yields an empty vector.
pub fn cluster_zmap(
    zmap: &Zmap,
    grid: &Grid3D,
    partitioning: &Partitioning,
    config: &ClusteringConfig,
) -> Vec<DensityCluster> {
    let mut outlying = vec![false; grid.len()];
    let mut seeds: Vec<usize> = Vec::new();
    for &idx in &partitioning.mask_indices {
        if zmap.values[idx].abs() >= config.contour_level {
            outlying[idx] = true;
            seeds.push(idx);
        }
    }
    if seeds.is_empty() {
        return Vec::new();
    }

    let offsets = grid.neighbor_offsets(config.cluster_cutoff_distance_multiplier);
    let mut visited = vec![false; grid.len()];
    let mut clusters = Vec::new();
    let mut queue = VecDeque::new();

    for &seed in &seeds {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        queue.push_back(seed);
        let mut members = Vec::new();
        while let Some(idx) = queue.pop_front() {
            members.push((idx, zmap.values[idx]));
            let [i, j, k] = grid.unravel(idx);
            for &(di, dj, dk) in &offsets {
                let (ni, nj, nk) = (i as i64 + di, j as i64 + dj, k as i64 + dk);
                if !grid.contains(ni, nj, nk) {
                    continue;
                }
                let nidx = grid.index(ni as usize, nj as usize, nk as usize);
                if outlying[nidx] && !visited[nidx] {
                    visited[nidx] = true;
                    queue.push_back(nidx);
                }
            }
        }
        clusters.push(DensityCluster::from_members(grid, members));
    }
    clusters
}

/// Fill in the event-mask footprint and the protein overlap counts for each
/// cluster: the footprint is the member set dilated by `event_mask_radius`,
/// clipped to the total analysis mask.
pub fn annotate_event_masks(
    clusters: &mut [DensityCluster],
    grid: &Grid3D,
    partitioning: &Partitioning,
    config: &ClusteringConfig,
) {
    let steps = config.event_mask_radius / grid.spacing;
    let offsets = grid.neighbor_offsets(steps);
    for cluster in clusters.iter_mut() {
        let mut footprint: Vec<usize> = cluster.indices.clone();
        for &idx in &cluster.indices {
            let [i, j, k] = grid.unravel(idx);
            for &(di, dj, dk) in &offsets {
                let (ni, nj, nk) = (i as i64 + di, j as i64 + dj, k as i64 + dk);
                if !grid.contains(ni, nj, nk) {
                    continue;
                }
                let nidx = grid.index(ni as usize, nj as usize, nk as usize);
                if partitioning.total_mask[nidx] {
                    footprint.push(nidx);
                }
            }
        }
        footprint.sort_unstable();
        footprint.dedup();
        cluster.event_mask_indices = footprint;
        cluster.inner_protein_overlap = cluster
            .indices
            .iter()
            .filter(|&&idx| partitioning.inner_mask[idx])
            .count();
        cluster.contact_overlap = cluster
            .indices
            .iter()
            .filter(|&&idx| partitioning.contact_mask[idx])
            .count();
    }
}
