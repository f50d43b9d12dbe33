//! Z-map evaluation: the standardised residual of an observed dataset
//! against a ground-state model.

use itertools::izip;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::grid::lattice::Grid3D;
use crate::grid::partitioning::Partitioning;
use crate::statistics::model::{GroundStateModel, ModelError};

/// Floor for the combined variance in the Z denominator.
pub const ZMAP_EPSILON: f64 = 1e-12;

/// Per-dataset Z-score map on the full grid. Voxels outside the total
/// analysis mask are zero.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Zmap {
    pub dtag: String,
    pub values: Vec<f32>,
}

/// Counting summary of a Z-map used by model selection and the run log.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ZmapStats {
    /// Voxels inside the total analysis mask.
    pub analysed_voxels: usize,
    /// Masked voxels with |z| at or above the outlier contour.
    pub outlier_voxels: usize,
}

impl Zmap {
    /// Evaluate the Z-map of one observed dataset against a model.
    ///
    /// `observed_masked` follows the partitioning's masked-voxel order. The
    /// denominator combines the dataset scale and the local noise in
    /// quadrature, `sqrt(sigma_i^2 + sigma_s_m^2)`, floored at
    /// `ZMAP_EPSILON`; a dataset without a recorded sigma_i gets one fitted
    /// against the model mean first. Pure function of its inputs.
    pub fn from_observed(
        dtag: &str,
        observed_masked: &[f32],
        model: &GroundStateModel,
        grid: &Grid3D,
        partitioning: &Partitioning,
        sigma_i_cutoff: f32,
    ) -> Result<Zmap, ModelError> {
        if observed_masked.len() != model.mean.len() {
            return Err(ModelError::ShapeMismatch {
                expected: model.mean.len(),
                got: observed_masked.len(),
            });
        }
        let sigma_i = model
            .sigma_i_for(dtag)
            .unwrap_or_else(|| model.fit_sigma_i(observed_masked, sigma_i_cutoff));

        let mut values = vec![0.0f32; grid.len()];
        for (&idx, &obs, &mean, &sigma_s) in izip!(
            partitioning.mask_indices.iter(),
            observed_masked.iter(),
            model.mean.iter(),
            model.sigma_s_m.iter()
        ) {
            let var = (sigma_i as f64).powi(2) + (sigma_s as f64).powi(2);
            let z = (obs as f64 - mean as f64) / var.max(ZMAP_EPSILON).sqrt();
            values[idx] = if z.is_finite() { z as f32 } else { 0.0 };
        }
        Ok(Zmap {
            dtag: dtag.to_string(),
            values,
        })
    }

    /// Count analysed and outlier voxels at the given contour.
    pub fn stats(&self, partitioning: &Partitioning, contour: f32) -> ZmapStats {
        let outlier_voxels = partitioning
            .mask_indices
            .iter()
            .filter(|&&idx| self.values[idx].abs() >= contour)
            .count();
        ZmapStats {
            analysed_voxels: partitioning.num_masked(),
            outlier_voxels,
        }
    }

    /// Linear index and value of the strongest |z| voxel.
    pub fn peak(&self) -> Option<(usize, f32)> {
        self.values
            .iter()
            .enumerate()
            .max_by_key(|(_, &v)| OrderedFloat(v.abs()))
            .map(|(idx, &v)| (idx, v))
    }

    /// Two-sided tail probability of a |z| under the standard normal,
    /// reported alongside event peaks.
    pub fn outlier_probability(z: f64) -> f64 {
        let normal = Normal::new(0.0, 1.0).unwrap();
        2.0 * (1.0 - normal.cdf(z.abs()))
    }
}
