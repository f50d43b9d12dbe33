//! Event construction: BDC search per surviving cluster, event-density map
//! synthesis, and ranking.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use denscore::grid::lattice::Grid3D;
use denscore::grid::partitioning::Partitioning;
use denscore::statistics::model::GroundStateModel;
use denscore::statistics::zmap::Zmap;

use crate::cluster::cluster::DensityCluster;
use crate::event::bdc::{estimate_bdc, BdcResult, BdcScorer, BdcSearchConfig};

/// A finalised candidate binding event for one dataset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub dtag: String,
    /// 1-based rank within the dataset (1 = best score).
    pub event_idx: usize,
    /// Estimated background-density-correction fraction.
    pub bdc: f32,
    pub score: f64,
    pub centroid: [f64; 3],
    pub n_voxels: usize,
    pub volume: f64,
    pub peak_z: f32,
    /// Filled by the site assignment pass.
    pub site_id: Option<usize>,
}

/// Full-grid event-density map belonging to one event.
#[derive(Clone, Debug)]
pub struct EventMap {
    pub values: Vec<f32>,
}

/// Build one event per cluster and rank them by score (descending), then by
/// size, so `event_idx` is deterministic.
///
/// `observed_full` is the dataset's aligned map on the full grid. The event
/// map is `(obs - bdc * mean) / (1 - bdc)` over the whole grid, with the
/// model mean taken as zero outside the analysis mask.
pub fn build_events(
    dtag: &str,
    clusters: &[DensityCluster],
    model: &GroundStateModel,
    observed_full: &[f32],
    zmap: &Zmap,
    grid: &Grid3D,
    partitioning: &Partitioning,
    config: &BdcSearchConfig,
    scorer: &dyn BdcScorer,
) -> Vec<(Event, EventMap)> {
    let mean_full = model.mean_on_grid(grid, partitioning);

    let mut built: Vec<(Event, EventMap, BdcResult)> = clusters
        .iter()
        .map(|cluster| {
            let footprint = if cluster.event_mask_indices.is_empty() {
                &cluster.indices
            } else {
                &cluster.event_mask_indices
            };
            let observed: Vec<f32> = footprint.iter().map(|&idx| observed_full[idx]).collect();
            let mean: Vec<f32> = footprint.iter().map(|&idx| mean_full[idx]).collect();
            let shape: Vec<f32> = footprint.iter().map(|&idx| zmap.values[idx]).collect();

            let result = estimate_bdc(&observed, &mean, &shape, config, scorer);
            let remainder = (1.0 - result.bdc).max(1e-3);
            let values: Vec<f32> = observed_full
                .iter()
                .zip(mean_full.iter())
                .map(|(&o, &m)| (o - result.bdc * m) / remainder)
                .collect();

            let event = Event {
                dtag: dtag.to_string(),
                event_idx: 0,
                bdc: result.bdc,
                score: result.score,
                centroid: cluster.centroid,
                n_voxels: cluster.size(),
                volume: cluster.volume(grid),
                peak_z: cluster.peak_z,
                site_id: None,
            };
            (event, EventMap { values }, result)
        })
        .collect();

    built.sort_by_key(|(event, _, _)| {
        (
            std::cmp::Reverse(OrderedFloat(event.score)),
            std::cmp::Reverse(event.n_voxels),
        )
    });
    built
        .into_iter()
        .enumerate()
        .map(|(rank, (mut event, map, _))| {
            event.event_idx = rank + 1;
            (event, map)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::cluster::{annotate_event_masks, cluster_zmap, ClusteringConfig};
    use crate::event::bdc::ShapeCorrelation;
    use denscore::grid::partitioning::MaskConfig;
    use denscore::statistics::masked::MaskedEnsemble;
    use nalgebra::Point3;

    #[test]
    fn test_events_are_ranked_and_deterministic() {
        let grid = Grid3D::new([12, 12, 12], 1.0, [0.0; 3]);
        let part = Partitioning::from_atoms(
            &grid,
            &[Point3::new(6.0, 6.0, 6.0)],
            &[],
            &MaskConfig {
                outer_mask: 10.0,
                ..MaskConfig::default()
            },
        );
        let n = part.num_masked();
        let rows: Vec<Vec<f32>> = (0..3)
            .map(|d| (0..n).map(|v| ((v * 3 + d) % 5) as f32 * 0.2 + 1.0).collect())
            .collect();
        let ens = MaskedEnsemble {
            dtags: (0..3).map(|i| format!("train_{}", i)).collect(),
            values: rows,
        };
        let model = GroundStateModel::from_ensembles(0, &ens, &ens, 1.5).unwrap();

        // observed = mean + strong blob
        let mean_full = model.mean_on_grid(&grid, &part);
        let mut observed = mean_full.clone();
        for k in 5..8 {
            for j in 5..8 {
                for i in 5..8 {
                    observed[grid.index(i, j, k)] += 4.0;
                }
            }
        }
        let observed_masked = part.extract(&observed);
        let zmap = Zmap::from_observed("blob", &observed_masked, &model, &grid, &part, 1.5)
            .unwrap();
        let ccfg = ClusteringConfig::default();
        let mut clusters = cluster_zmap(&zmap, &grid, &part, &ccfg);
        annotate_event_masks(&mut clusters, &grid, &part, &ccfg);
        assert!(!clusters.is_empty());

        let events_a = build_events(
            "blob",
            &clusters,
            &model,
            &observed,
            &zmap,
            &grid,
            &part,
            &BdcSearchConfig::default(),
            &ShapeCorrelation,
        );
        let events_b = build_events(
            "blob",
            &clusters,
            &model,
            &observed,
            &zmap,
            &grid,
            &part,
            &BdcSearchConfig::default(),
            &ShapeCorrelation,
        );
        assert_eq!(events_a.len(), events_b.len());
        for ((ea, _), (eb, _)) in events_a.iter().zip(events_b.iter()) {
            assert_eq!(ea.bdc, eb.bdc);
            assert_eq!(ea.score, eb.score);
        }
        assert_eq!(events_a[0].0.event_idx, 1);
        let e = &events_a[0].0;
        assert!(e.bdc > 0.0 && e.bdc < 1.0);
        assert!(e.peak_z > 3.0);
    }
}
