//! Synthetic ensemble generation for tests and demos.

use std::collections::BTreeMap;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;

use crate::grid::lattice::Grid3D;

/// Configuration for a flat-noise ensemble.
#[derive(Clone, Debug)]
pub struct EnsembleConfig {
    /// Number of datasets to generate.
    pub n_datasets: usize,
    /// Mean of the voxel noise.
    pub noise_mean: f64,
    /// Standard deviation of the voxel noise.
    pub noise_std: f64,
    /// RNG seed; the ensemble is fully determined by it.
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        EnsembleConfig {
            n_datasets: 30,
            noise_mean: 0.0,
            noise_std: 0.1,
            seed: 42,
        }
    }
}

/// Generate `n_datasets` full-grid maps of gaussian noise, keyed
/// `synthetic_000`, `synthetic_001`, ...
pub fn flat_noise_ensemble(grid: &Grid3D, config: &EnsembleConfig) -> BTreeMap<String, Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let dist = Normal::new(config.noise_mean, config.noise_std.max(1e-12)).unwrap();
    let mut maps = BTreeMap::new();
    for d in 0..config.n_datasets {
        let values: Vec<f32> = (0..grid.len()).map(|_| dist.sample(&mut rng) as f32).collect();
        maps.insert(format!("synthetic_{:03}", d), values);
    }
    maps
}

/// Add a cubic density blob of the given height to a full-grid map. The
/// blob spans `center - half_width ..= center + half_width` along each axis,
/// clipped to the grid.
pub fn insert_blob(
    values: &mut [f32],
    grid: &Grid3D,
    center: [usize; 3],
    half_width: usize,
    height: f32,
) {
    let h = half_width as i64;
    for dk in -h..=h {
        for dj in -h..=h {
            for di in -h..=h {
                let i = center[0] as i64 + di;
                let j = center[1] as i64 + dj;
                let k = center[2] as i64 + dk;
                if grid.contains(i, j, k) {
                    values[grid.index(i as usize, j as usize, k as usize)] += height;
                }
            }
        }
    }
}
