//! The ground-state statistical model.
//!
//! A model is built from a characterisation (training) subset of the shell
//! ensemble: a per-voxel mean, a per-dataset residual scale (`sigma_i`) and
//! a per-voxel local noise term (`sigma_s_m`). Several models may coexist
//! for one test dataset, one per comparator subset; each is immutable once
//! constructed and keyed by the comparator id that produced it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bincode::{Decode, Encode};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithm::utility::{std as std_dev, trimmed_scale_fit};
use crate::grid::lattice::Grid3D;
use crate::grid::partitioning::Partitioning;
use crate::statistics::masked::MaskedEnsemble;

/// Minimum number of characterisation datasets for a meaningful variance.
pub const MIN_TRAINING_DATASETS: usize = 2;

/// Number of re-trim rounds for the sigma_i fit.
pub const SIGMA_I_FIT_ROUNDS: usize = 10;

/// Floor applied to sigma_i when it divides a residual.
pub const SIGMA_I_FLOOR: f32 = 1e-6;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("insufficient characterisation datasets: needed {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("dataset {0} is not present in the ensemble")]
    MissingDataset(String),
    #[error("array length {got} does not match expected length {expected}")]
    ShapeMismatch { expected: usize, got: usize },
}

/// Immutable ground-state model for one comparator subset.
#[derive(Clone, Debug, Serialize, Deserialize, Encode, Decode)]
pub struct GroundStateModel {
    /// Id of the comparator subset this model was trained on.
    pub comparator_id: usize,
    /// Ensemble mean per masked voxel.
    pub mean: Vec<f32>,
    /// Residual scale per dataset (training and test datasets of the shell).
    pub sigma_is: BTreeMap<String, f32>,
    /// Local noise per masked voxel.
    pub sigma_s_m: Vec<f32>,
}

impl GroundStateModel {
    /// Elementwise mean over the characterisation ensemble.
    pub fn mean_from_ensemble(train: &MaskedEnsemble) -> Result<Vec<f32>, ModelError> {
        if train.n_datasets() < MIN_TRAINING_DATASETS {
            return Err(ModelError::InsufficientData {
                needed: MIN_TRAINING_DATASETS,
                got: train.n_datasets(),
            });
        }
        let n_voxels = train.n_voxels();
        let n = train.n_datasets() as f64;
        let mut mean = vec![0.0f64; n_voxels];
        for row in &train.values {
            for (m, &v) in mean.iter_mut().zip(row.iter()) {
                *m += v as f64;
            }
        }
        Ok(mean.into_iter().map(|m| (m / n) as f32).collect())
    }

    /// Per-voxel standard deviation of the raw residual `obs - mean` over
    /// the characterisation ensemble, used as the trimming scale for the
    /// sigma_i fit.
    pub fn local_std_from_ensemble(train: &MaskedEnsemble, mean: &[f32]) -> Vec<f32> {
        let n_voxels = train.n_voxels();
        (0..n_voxels)
            .into_par_iter()
            .with_min_len(1024)
            .map(|v| {
                let residuals: Vec<f32> = train
                    .values
                    .iter()
                    .map(|row| row[v] - mean[v])
                    .collect();
                let s = std_dev(&residuals) as f32;
                if s.is_finite() {
                    s
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Residual scale per dataset: the scalar minimising the squared
    /// residual of the dataset against the mean, with voxels more than
    /// `cutoff` local standard deviations away trimmed out.
    ///
    /// The ensemble passed here is usually the characterisation datasets
    /// plus the shell's test datasets, so every dataset the shell touches
    /// gets a scale.
    pub fn sigma_is_from_ensemble(
        all: &MaskedEnsemble,
        mean: &[f32],
        cutoff: f32,
    ) -> Result<BTreeMap<String, f32>, ModelError> {
        if all.n_datasets() < MIN_TRAINING_DATASETS {
            return Err(ModelError::InsufficientData {
                needed: MIN_TRAINING_DATASETS,
                got: all.n_datasets(),
            });
        }
        if all.n_voxels() != mean.len() {
            return Err(ModelError::ShapeMismatch {
                expected: mean.len(),
                got: all.n_voxels(),
            });
        }
        let local_std = Self::local_std_from_ensemble(all, mean);
        let sigma_is: Vec<(String, f32)> = all
            .dtags
            .par_iter()
            .zip(all.values.par_iter())
            .map(|(dtag, row)| {
                let s = trimmed_scale_fit(row, mean, &local_std, cutoff, SIGMA_I_FIT_ROUNDS);
                (dtag.clone(), s)
            })
            .collect();
        Ok(sigma_is.into_iter().collect())
    }

    /// Per-voxel standard deviation of the scale-normalised residual
    /// `(obs - mean) / sigma_i` over the characterisation ensemble.
    ///
    /// This is the dominant cost of model construction, O(voxels x
    /// datasets); the voxel axis is chunked across the rayon pool.
    /// Non-finite results collapse to 0 (no local variance observed).
    pub fn sigma_sm_from_ensemble(
        train: &MaskedEnsemble,
        mean: &[f32],
        sigma_is: &BTreeMap<String, f32>,
    ) -> Vec<f32> {
        let scales: Vec<f32> = train
            .dtags
            .iter()
            .map(|dtag| {
                sigma_is
                    .get(dtag)
                    .copied()
                    .unwrap_or(1.0)
                    .max(SIGMA_I_FLOOR)
            })
            .collect();
        (0..train.n_voxels())
            .into_par_iter()
            .with_min_len(1024)
            .map(|v| {
                let normalised: Vec<f32> = train
                    .values
                    .iter()
                    .zip(scales.iter())
                    .map(|(row, &s)| (row[v] - mean[v]) / s)
                    .collect();
                let s = std_dev(&normalised) as f32;
                if s.is_finite() && s > 0.0 {
                    s
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Build the full model: mean from the characterisation subset, sigma_i
    /// over the whole shell ensemble, sigma_s_m from the characterisation
    /// subset again.
    pub fn from_ensembles(
        comparator_id: usize,
        train: &MaskedEnsemble,
        all: &MaskedEnsemble,
        sigma_i_cutoff: f32,
    ) -> Result<Self, ModelError> {
        let mean = Self::mean_from_ensemble(train)?;
        let sigma_is = Self::sigma_is_from_ensemble(all, &mean, sigma_i_cutoff)?;
        let sigma_s_m = Self::sigma_sm_from_ensemble(train, &mean, &sigma_is);
        Ok(GroundStateModel {
            comparator_id,
            mean,
            sigma_is,
            sigma_s_m,
        })
    }

    /// The residual scale recorded for a dataset, if the shell computed one.
    pub fn sigma_i_for(&self, dtag: &str) -> Option<f32> {
        self.sigma_is.get(dtag).copied()
    }

    /// Fit a residual scale for a dataset that was not part of the shell
    /// ensemble, against this model's mean. The local noise term stands in
    /// for the per-voxel trimming scale.
    pub fn fit_sigma_i(&self, observed_masked: &[f32], cutoff: f32) -> f32 {
        trimmed_scale_fit(
            observed_masked,
            &self.mean,
            &self.sigma_s_m,
            cutoff,
            SIGMA_I_FIT_ROUNDS,
        )
    }

    /// The mean scattered back onto the full grid (zeros outside the mask).
    pub fn mean_on_grid(&self, grid: &Grid3D, partitioning: &Partitioning) -> Vec<f32> {
        partitioning.embed(&self.mean, grid.len())
    }

    /// The local noise term scattered back onto the full grid.
    pub fn sigma_on_grid(&self, grid: &Grid3D, partitioning: &Partitioning) -> Vec<f32> {
        partitioning.embed(&self.sigma_s_m, grid.len())
    }

    /// Persist the model as a compact binary file.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = bincode::encode_to_vec(self, bincode::config::standard())?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Load a model previously written by [`GroundStateModel::save`].
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let (model, _) = bincode::decode_from_slice(&bytes, bincode::config::standard())?;
        Ok(model)
    }
}
