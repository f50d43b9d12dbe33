//! Selection of one ground-state model per test dataset.
//!
//! Several models (one per comparator subset) are evaluated against the
//! same dataset; exactly one proceeds to event building. Two selection
//! heuristics exist side by side and the orchestrator picks one; neither
//! is obviously superior on current screens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use denscore::statistics::zmap::{Zmap, ZmapStats};

use crate::cluster::cluster::DensityCluster;
use crate::cluster::scoring::ClusterStats;

/// Which heuristic decides the winning model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStrategy {
    /// Map-level signal/noise balance: clustered outlier fraction minus
    /// outlier rate.
    #[default]
    SignalToNoise,
    /// The model containing the single best-scoring cluster (contact
    /// overlap versus protein overlap) wins.
    BestClusterScore,
}

/// Everything produced by evaluating one model against one dataset, in
/// named fields rather than a string-keyed bag.
#[derive(Clone, Debug)]
pub struct ModelEvaluation {
    pub model_id: usize,
    pub zmap: Zmap,
    pub zmap_stats: ZmapStats,
    pub clusters_initial: Vec<DensityCluster>,
    pub clusters_large: Vec<DensityCluster>,
    pub clusters_peaked: Vec<DensityCluster>,
    pub clusters_merged: Vec<DensityCluster>,
    pub cluster_stats: Vec<ClusterStats>,
}

/// Pick the winning model id.
///
/// Ties resolve to the lowest model id; when every model produced zero
/// merged clusters the lowest id wins outright (its Z-map is still
/// reported, with zero events).
pub fn select_model(
    evaluations: &BTreeMap<usize, ModelEvaluation>,
    strategy: SelectionStrategy,
) -> usize {
    let fallback = evaluations.keys().next().copied().unwrap_or(0);
    if evaluations
        .values()
        .all(|e| e.clusters_merged.is_empty())
    {
        return fallback;
    }
    match strategy {
        SelectionStrategy::SignalToNoise => {
            let mut best: Option<(usize, f64)> = None;
            for (&model_id, eval) in evaluations {
                let clustered: usize = eval.clusters_large.iter().map(|c| c.size()).sum();
                let outliers = eval.zmap_stats.outlier_voxels.max(1) as f64;
                let analysed = eval.zmap_stats.analysed_voxels.max(1) as f64;
                let signal = clustered as f64 / outliers;
                let noise = eval.zmap_stats.outlier_voxels as f64 / analysed;
                let score = signal - noise;
                match best {
                    Some((_, best_score)) if score <= best_score => {}
                    _ => best = Some((model_id, score)),
                }
            }
            best.map(|(id, _)| id).unwrap_or(fallback)
        }
        SelectionStrategy::BestClusterScore => {
            let mut best: Option<(usize, f64)> = None;
            for (&model_id, eval) in evaluations {
                for stats in &eval.cluster_stats {
                    let score = stats.signal_to_noise;
                    match best {
                        Some((_, best_score)) if score <= best_score => {}
                        _ => best = Some((model_id, score)),
                    }
                }
            }
            best.map(|(id, _)| id).unwrap_or(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denscore::grid::lattice::Grid3D;

    fn eval_with(
        model_id: usize,
        clustered: usize,
        outliers: usize,
        analysed: usize,
        best_cluster_s2n: f64,
    ) -> ModelEvaluation {
        let grid = Grid3D::new([8, 8, 8], 1.0, [0.0; 3]);
        let clusters = if clustered > 0 {
            vec![DensityCluster::from_members(
                &grid,
                (0..clustered).map(|i| (i, 4.0f32)).collect(),
            )]
        } else {
            Vec::new()
        };
        let stats = if clustered > 0 {
            vec![ClusterStats {
                signal_to_noise: best_cluster_s2n,
                ..ClusterStats::default()
            }]
        } else {
            Vec::new()
        };
        ModelEvaluation {
            model_id,
            zmap: Zmap {
                dtag: "t".to_string(),
                values: Vec::new(),
            },
            zmap_stats: ZmapStats {
                analysed_voxels: analysed,
                outlier_voxels: outliers,
            },
            clusters_initial: clusters.clone(),
            clusters_large: clusters.clone(),
            clusters_peaked: clusters.clone(),
            clusters_merged: clusters,
            cluster_stats: stats,
        }
    }

    #[test]
    fn test_signal_to_noise_prefers_clustered_outliers() {
        let mut evals = BTreeMap::new();
        // model 0: half the outliers clustered; model 1: all clustered
        evals.insert(0, eval_with(0, 20, 40, 4000, 0.5));
        evals.insert(1, eval_with(1, 40, 40, 4000, 0.5));
        assert_eq!(select_model(&evals, SelectionStrategy::SignalToNoise), 1);
    }

    #[test]
    fn test_best_cluster_strategy() {
        let mut evals = BTreeMap::new();
        evals.insert(0, eval_with(0, 20, 40, 4000, 0.2));
        evals.insert(1, eval_with(1, 20, 40, 4000, 3.0));
        assert_eq!(select_model(&evals, SelectionStrategy::BestClusterScore), 1);
    }

    #[test]
    fn test_all_empty_falls_back_to_lowest_id() {
        let mut evals = BTreeMap::new();
        evals.insert(3, eval_with(3, 0, 0, 4000, 0.0));
        evals.insert(7, eval_with(7, 0, 0, 4000, 0.0));
        assert_eq!(select_model(&evals, SelectionStrategy::SignalToNoise), 3);
        assert_eq!(select_model(&evals, SelectionStrategy::BestClusterScore), 3);
    }

    #[test]
    fn test_tie_breaks_to_lowest_id() {
        let mut evals = BTreeMap::new();
        evals.insert(2, eval_with(2, 30, 40, 4000, 1.0));
        evals.insert(5, eval_with(5, 30, 40, 4000, 1.0));
        assert_eq!(select_model(&evals, SelectionStrategy::SignalToNoise), 2);
        assert_eq!(select_model(&evals, SelectionStrategy::BestClusterScore), 2);
    }
}
