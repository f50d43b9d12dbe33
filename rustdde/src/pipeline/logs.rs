//! Typed run-log accumulators.
//!
//! Logs are plain values returned alongside results and merged by the
//! orchestrator; nothing here is global or mutable across tasks. They
//! serialise to the JSON files written next to each processed dataset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use denscore::statistics::zmap::ZmapStats;

use crate::cluster::scoring::ClusterStats;

/// Cluster counts after each filter stage.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ClusterStageLog {
    pub initial: usize,
    pub size_filtered: usize,
    pub peak_filtered: usize,
    pub merged: usize,
}

/// Summary of one large cluster for the log's top-ten table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LargestClusterLog {
    pub volume: f64,
    pub centroid: [f64; 3],
}

/// Everything recorded while evaluating one model against one dataset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelAnalysisLog {
    pub train_dtags: Vec<String>,
    pub stages: ClusterStageLog,
    pub zmap_stats: ZmapStats,
    /// Ten largest initial clusters, largest first.
    pub largest_clusters: Vec<LargestClusterLog>,
    pub cluster_stats: Vec<ClusterStats>,
    pub zmap_time_s: f64,
    pub cluster_time_s: f64,
}

/// Per-event entry of the dataset log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLog {
    pub event_idx: usize,
    pub bdc: f32,
    pub score: f64,
}

/// The per-dataset JSON log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatasetLog {
    pub dtag: String,
    pub models: BTreeMap<usize, ModelAnalysisLog>,
    pub selected_model: usize,
    pub event_count: usize,
    pub events: Vec<EventLog>,
    pub event_time_s: f64,
    pub total_time_s: f64,
}

/// The per-shell JSON log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShellLog {
    pub res: f64,
    pub datasets: Vec<String>,
    pub dataset_logs: BTreeMap<String, DatasetLog>,
    /// Datasets whose analysis failed, with the recorded reason.
    pub failures: BTreeMap<String, String>,
    pub model_time_s: f64,
    pub total_time_s: f64,
}
