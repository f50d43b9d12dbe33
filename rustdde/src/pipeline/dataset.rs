//! Per-dataset analysis: every candidate model is evaluated against the
//! test dataset, one is selected, and its surviving clusters become events.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use denscore::grid::lattice::Grid3D;
use denscore::grid::partitioning::Partitioning;
use denscore::statistics::model::GroundStateModel;
use denscore::statistics::zmap::Zmap;

use crate::cluster::cluster::{annotate_event_masks, cluster_zmap, ClusteringConfig};
use crate::cluster::filter::BlobFilter;
use crate::cluster::merge::merge_clusters;
use crate::cluster::scoring::score_cluster;
use crate::event::bdc::{BdcScorer, BdcSearchConfig, ShapeCorrelation};
use crate::event::builder::{build_events, Event};
use crate::io::{
    event_map_file_name, mean_map_file_name, std_map_file_name, zmap_file_name, MapSink,
};
use crate::pipeline::logs::{
    ClusterStageLog, DatasetLog, EventLog, LargestClusterLog, ModelAnalysisLog,
};
use crate::pipeline::selector::{select_model, ModelEvaluation, SelectionStrategy};

/// Number of initial clusters summarised in the log.
const LOGGED_CLUSTERS: usize = 10;

/// All thresholds of the per-dataset analysis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub clustering: ClusteringConfig,
    pub blob_filter: BlobFilter,
    pub bdc: BdcSearchConfig,
    /// Centroid distance below which clusters merge.
    pub merge_distance: f64,
    /// Contour used for outlier counting during model selection.
    pub selector_contour: f32,
    /// Trimming cutoff of the sigma_i fit, in local standard deviations.
    pub sigma_i_cutoff: f32,
    /// Centroid distance below which events share a site.
    pub max_site_distance_cutoff: f64,
    pub strategy: SelectionStrategy,
    /// Also persist the model mean and local-noise maps per dataset.
    pub statmaps: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            clustering: ClusteringConfig::default(),
            blob_filter: BlobFilter::default(),
            bdc: BdcSearchConfig::default(),
            merge_distance: 5.0,
            selector_contour: 2.0,
            sigma_i_cutoff: 1.5,
            max_site_distance_cutoff: 1.732,
            strategy: SelectionStrategy::default(),
            statmaps: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset {dtag}: {reason}")]
    Analysis { dtag: String, reason: String },
    #[error("dataset {dtag}: failed to write {name}: {source}")]
    Io {
        dtag: String,
        name: String,
        source: std::io::Error,
    },
}

/// Events and log for one analysed dataset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetResult {
    pub dtag: String,
    pub events: Vec<Event>,
    pub log: DatasetLog,
}

/// Analyse one test dataset against a set of candidate models.
///
/// `observed_full` is the dataset's aligned map on the full grid;
/// `train_dtags` records, per model, which datasets characterised it (for
/// the log only). The selected model's Z-map, the per-event density maps
/// and (optionally) the statistical maps go to `sink`; the caller owns the
/// returned log.
pub fn analyze_dataset(
    test_dtag: &str,
    models: &BTreeMap<usize, GroundStateModel>,
    train_dtags: &BTreeMap<usize, Vec<String>>,
    observed_full: &[f32],
    grid: &Grid3D,
    partitioning: &Partitioning,
    config: &AnalysisConfig,
    sink: &dyn MapSink,
) -> Result<DatasetResult, DatasetError> {
    let started = Instant::now();
    if models.is_empty() {
        return Err(DatasetError::Analysis {
            dtag: test_dtag.to_string(),
            reason: "no candidate models supplied".to_string(),
        });
    }
    let observed_masked = partitioning.extract(observed_full);

    let mut evaluations: BTreeMap<usize, ModelEvaluation> = BTreeMap::new();
    let mut model_logs: BTreeMap<usize, ModelAnalysisLog> = BTreeMap::new();

    for (&model_id, model) in models {
        let zmap_started = Instant::now();
        let zmap = Zmap::from_observed(
            test_dtag,
            &observed_masked,
            model,
            grid,
            partitioning,
            config.sigma_i_cutoff,
        )
        .map_err(|e| DatasetError::Analysis {
            dtag: test_dtag.to_string(),
            reason: e.to_string(),
        })?;
        let zmap_time_s = zmap_started.elapsed().as_secs_f64();
        let zmap_stats = zmap.stats(partitioning, config.selector_contour);

        let cluster_started = Instant::now();
        let clusters_initial = cluster_zmap(&zmap, grid, partitioning, &config.clustering);
        let clusters_large = config
            .blob_filter
            .filter_size(grid, &clusters_initial);
        let mut clusters_peaked = config.blob_filter.filter_peak(&clusters_large);
        annotate_event_masks(&mut clusters_peaked, grid, partitioning, &config.clustering);
        let cluster_stats: Vec<_> = clusters_peaked
            .iter()
            .map(|c| score_cluster(c, &zmap, config.selector_contour))
            .collect();
        let clusters_merged = merge_clusters(
            clusters_peaked.clone(),
            config.merge_distance,
            grid,
            partitioning,
            &config.clustering,
        );
        let cluster_time_s = cluster_started.elapsed().as_secs_f64();

        let mut largest: Vec<LargestClusterLog> = clusters_initial
            .iter()
            .map(|c| LargestClusterLog {
                volume: c.volume(grid),
                centroid: c.centroid,
            })
            .collect();
        largest.sort_by(|a, b| b.volume.total_cmp(&a.volume));
        largest.truncate(LOGGED_CLUSTERS);

        model_logs.insert(
            model_id,
            ModelAnalysisLog {
                train_dtags: train_dtags.get(&model_id).cloned().unwrap_or_default(),
                stages: ClusterStageLog {
                    initial: clusters_initial.len(),
                    size_filtered: clusters_large.len(),
                    peak_filtered: clusters_peaked.len(),
                    merged: clusters_merged.len(),
                },
                zmap_stats,
                largest_clusters: largest,
                cluster_stats: cluster_stats.clone(),
                zmap_time_s,
                cluster_time_s,
            },
        );
        evaluations.insert(
            model_id,
            ModelEvaluation {
                model_id,
                zmap,
                zmap_stats,
                clusters_initial,
                clusters_large,
                clusters_peaked,
                clusters_merged,
                cluster_stats,
            },
        );
    }

    let selected_model = select_model(&evaluations, config.strategy);
    let evaluation = &evaluations[&selected_model];
    let model = &models[&selected_model];

    sink.write_map(&zmap_file_name(test_dtag), grid, &evaluation.zmap.values)
        .map_err(|e| DatasetError::Io {
            dtag: test_dtag.to_string(),
            name: zmap_file_name(test_dtag),
            source: e,
        })?;
    if config.statmaps {
        let mean_full = model.mean_on_grid(grid, partitioning);
        sink.write_map(&mean_map_file_name(test_dtag), grid, &mean_full)
            .map_err(|e| DatasetError::Io {
                dtag: test_dtag.to_string(),
                name: mean_map_file_name(test_dtag),
                source: e,
            })?;
        let sigma_full = model.sigma_on_grid(grid, partitioning);
        sink.write_map(&std_map_file_name(test_dtag), grid, &sigma_full)
            .map_err(|e| DatasetError::Io {
                dtag: test_dtag.to_string(),
                name: std_map_file_name(test_dtag),
                source: e,
            })?;
    }

    let event_started = Instant::now();
    let scorer = ShapeCorrelation;
    let built = build_events(
        test_dtag,
        &evaluation.clusters_merged,
        model,
        observed_full,
        &evaluation.zmap,
        grid,
        partitioning,
        &config.bdc,
        &scorer as &dyn BdcScorer,
    );
    let mut events = Vec::with_capacity(built.len());
    for (event, event_map) in built {
        let name = event_map_file_name(test_dtag, event.event_idx, event.bdc);
        sink.write_map(&name, grid, &event_map.values)
            .map_err(|e| DatasetError::Io {
                dtag: test_dtag.to_string(),
                name: name.clone(),
                source: e,
            })?;
        events.push(event);
    }
    let event_time_s = event_started.elapsed().as_secs_f64();

    let log = DatasetLog {
        dtag: test_dtag.to_string(),
        models: model_logs,
        selected_model,
        event_count: events.len(),
        events: events
            .iter()
            .map(|e| EventLog {
                event_idx: e.event_idx,
                bdc: e.bdc,
                score: e.score,
            })
            .collect(),
        event_time_s,
        total_time_s: started.elapsed().as_secs_f64(),
    };

    Ok(DatasetResult {
        dtag: test_dtag.to_string(),
        events,
        log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::NullSink;
    use denscore::grid::partitioning::MaskConfig;
    use denscore::statistics::masked::MaskedEnsemble;
    use nalgebra::Point3;

    #[test]
    fn test_no_models_is_an_error() {
        let grid = Grid3D::new([6, 6, 6], 1.0, [0.0; 3]);
        let part = Partitioning::from_atoms(
            &grid,
            &[Point3::new(3.0, 3.0, 3.0)],
            &[],
            &MaskConfig::default(),
        );
        let observed = vec![0.0f32; grid.len()];
        let result = analyze_dataset(
            "lonely",
            &BTreeMap::new(),
            &BTreeMap::new(),
            &observed,
            &grid,
            &part,
            &AnalysisConfig::default(),
            &NullSink,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_mean_twin_has_zero_events_and_full_log() {
        let grid = Grid3D::new([8, 8, 8], 1.0, [0.0; 3]);
        let part = Partitioning::from_atoms(
            &grid,
            &[Point3::new(4.0, 4.0, 4.0)],
            &[],
            &MaskConfig::default(),
        );
        let n = part.num_masked();
        let rows: Vec<Vec<f32>> = (0..4)
            .map(|d| (0..n).map(|v| ((v + d) % 3) as f32 * 0.5 + 1.0).collect())
            .collect();
        let ens = MaskedEnsemble {
            dtags: (0..4).map(|i| format!("train_{}", i)).collect(),
            values: rows,
        };
        let model = GroundStateModel::from_ensembles(0, &ens, &ens, 1.5).unwrap();
        let observed = part.embed(&model.mean, grid.len());

        let mut models = BTreeMap::new();
        models.insert(0usize, model);
        let mut train = BTreeMap::new();
        train.insert(0usize, ens.dtags.clone());

        let config = AnalysisConfig {
            statmaps: true,
            ..AnalysisConfig::default()
        };
        let result = analyze_dataset(
            "mean_twin",
            &models,
            &train,
            &observed,
            &grid,
            &part,
            &config,
            &NullSink,
        )
        .unwrap();
        assert_eq!(result.events.len(), 0);
        assert_eq!(result.log.event_count, 0);
        assert_eq!(result.log.selected_model, 0);
        let stage = &result.log.models[&0].stages;
        assert_eq!(stage.initial, 0);
        assert_eq!(stage.merged, 0);
    }
}
