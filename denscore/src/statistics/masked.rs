use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::lattice::Grid3D;
use crate::grid::partitioning::Partitioning;
use crate::statistics::model::ModelError;

/// The masked values of one aligned dataset, in `Partitioning::mask_indices`
/// order. Every row of the same ensemble shares that ordering, so index `v`
/// refers to the same voxel in every dataset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaskedEnsemble {
    pub dtags: Vec<String>,
    /// One row per dtag, `num_masked` values each.
    pub values: Vec<Vec<f32>>,
}

impl MaskedEnsemble {
    /// Restrict a set of aligned full-grid maps to the total analysis mask.
    ///
    /// Every map must match the grid length exactly; the row order follows
    /// the (sorted) map keys so the ensemble is reproducible independent of
    /// insertion order.
    pub fn from_aligned_maps(
        maps: &BTreeMap<String, Vec<f32>>,
        grid: &Grid3D,
        partitioning: &Partitioning,
    ) -> Result<Self, ModelError> {
        let mut dtags = Vec::with_capacity(maps.len());
        let mut values = Vec::with_capacity(maps.len());
        for (dtag, full) in maps {
            if full.len() != grid.len() {
                return Err(ModelError::ShapeMismatch {
                    expected: grid.len(),
                    got: full.len(),
                });
            }
            dtags.push(dtag.clone());
            values.push(partitioning.extract(full));
        }
        Ok(MaskedEnsemble { dtags, values })
    }

    /// Number of masked voxels per row (0 for an empty ensemble).
    pub fn n_voxels(&self) -> usize {
        self.values.first().map(|row| row.len()).unwrap_or(0)
    }

    pub fn n_datasets(&self) -> usize {
        self.dtags.len()
    }

    /// The row for one dataset, if present.
    pub fn row(&self, dtag: &str) -> Option<&[f32]> {
        self.dtags
            .iter()
            .position(|d| d == dtag)
            .map(|i| self.values[i].as_slice())
    }

    /// A new ensemble containing only the requested dtags, in the requested
    /// order. Errors on a dtag that is not present.
    pub fn subset(&self, dtags: &[String]) -> Result<MaskedEnsemble, ModelError> {
        let mut out_dtags = Vec::with_capacity(dtags.len());
        let mut out_values = Vec::with_capacity(dtags.len());
        for dtag in dtags {
            let row = self
                .row(dtag)
                .ok_or_else(|| ModelError::MissingDataset(dtag.clone()))?;
            out_dtags.push(dtag.clone());
            out_values.push(row.to_vec());
        }
        Ok(MaskedEnsemble {
            dtags: out_dtags,
            values: out_values,
        })
    }
}
