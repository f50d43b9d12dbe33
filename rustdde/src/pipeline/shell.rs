//! Resolution shells: grouping datasets for batch processing, building the
//! per-comparator ground-state models, and running every test dataset of a
//! shell through the analysis.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use denscore::grid::lattice::Grid3D;
use denscore::grid::partitioning::Partitioning;
use denscore::statistics::masked::MaskedEnsemble;
use denscore::statistics::model::{GroundStateModel, ModelError};

use crate::io::MapSink;
use crate::mapper::Mapper;
use crate::pipeline::dataset::{analyze_dataset, AnalysisConfig, DatasetResult};
use crate::pipeline::logs::ShellLog;

/// One comparator cluster: for every dataset, its distance to the cluster
/// core. Computing these distances (map-space embedding, dendrograms) is an
/// upstream concern; shells only consume the ordering.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ComparatorCluster {
    pub dtag_distance: BTreeMap<String, f64>,
}

/// Parameters of shell assembly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Minimum number of characterisation datasets per comparator set.
    pub min_characterisation_datasets: usize,
    /// Cap on the characterisation set size per comparator cluster.
    pub max_shell_datasets: usize,
    /// Resolution stepping between consecutive shells, in Angstrom.
    pub high_res_increment: f64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            min_characterisation_datasets: 25,
            max_shell_datasets: 60,
            high_res_increment: 0.05,
        }
    }
}

/// A group of datasets processed together at a common resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Shell {
    pub res: f64,
    pub test_dtags: Vec<String>,
    /// Characterisation datasets per comparator-cluster id.
    pub train_dtags: BTreeMap<usize, Vec<String>>,
    pub all_dtags: Vec<String>,
}

impl Shell {
    pub fn new(
        res: f64,
        test_dtags: Vec<String>,
        train_dtags: BTreeMap<usize, Vec<String>>,
    ) -> Self {
        let mut all: BTreeSet<String> = test_dtags.iter().cloned().collect();
        for dtags in train_dtags.values() {
            all.extend(dtags.iter().cloned());
        }
        Shell {
            res,
            test_dtags,
            train_dtags,
            all_dtags: all.into_iter().collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("comparator set {comparator_id} has {got} datasets, needed {needed}")]
    InsufficientComparators {
        comparator_id: usize,
        got: usize,
        needed: usize,
    },
    #[error("no shell could be assembled from {n_datasets} datasets")]
    NoShells { n_datasets: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Assemble resolution shells from per-dataset resolutions and comparator
/// clusters.
///
/// Shells step from the lowest resolution at which enough characterisation
/// data exists up to the worst dataset resolution. Each test dataset lands
/// in the first shell that covers its resolution; each comparator cluster
/// contributes its closest datasets of sufficient resolution, capped at
/// `max_shell_datasets`. Clusters that cannot field the minimum are
/// dropped from that shell; shells with no usable cluster or no test
/// dataset are dropped entirely.
pub fn get_shells(
    resolutions: &BTreeMap<String, f64>,
    comparators: &BTreeMap<usize, ComparatorCluster>,
    config: &ShellConfig,
) -> Result<Vec<Shell>, PipelineError> {
    let mut by_res: Vec<(&String, f64)> = resolutions.iter().map(|(d, &r)| (d, r)).collect();
    by_res.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(b.0)));

    if by_res.len() <= config.min_characterisation_datasets {
        return Err(PipelineError::NoShells {
            n_datasets: by_res.len(),
        });
    }
    let lowest_valid_res = by_res[config.min_characterisation_datasets].1;
    let max_res = by_res.last().map(|&(_, r)| r).unwrap_or(lowest_valid_res);

    let mut shell_reses = Vec::new();
    let mut res = lowest_valid_res;
    while res < max_res + config.high_res_increment {
        shell_reses.push(res);
        res += config.high_res_increment;
    }

    let mut assigned: BTreeSet<String> = BTreeSet::new();
    let mut shells = Vec::new();
    for &shell_res in &shell_reses {
        let test_dtags: Vec<String> = by_res
            .iter()
            .filter(|&&(dtag, r)| r <= shell_res && !assigned.contains(dtag))
            .map(|&(dtag, _)| dtag.clone())
            .collect();
        if test_dtags.is_empty() {
            continue;
        }

        let mut train_dtags: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (&cluster_id, cluster) in comparators {
            let mut candidates: Vec<(&String, f64)> = cluster
                .dtag_distance
                .iter()
                .filter(|(dtag, _)| {
                    resolutions
                        .get(*dtag)
                        .map(|&r| r <= shell_res)
                        .unwrap_or(false)
                })
                .map(|(dtag, &dist)| (dtag, dist))
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(b.0)));
            candidates.truncate(config.max_shell_datasets);
            if candidates.len() >= config.min_characterisation_datasets {
                train_dtags.insert(
                    cluster_id,
                    candidates.into_iter().map(|(dtag, _)| dtag.clone()).collect(),
                );
            }
        }
        if train_dtags.is_empty() {
            continue;
        }

        assigned.extend(test_dtags.iter().cloned());
        shells.push(Shell::new(shell_res, test_dtags, train_dtags));
    }

    if shells.is_empty() {
        return Err(PipelineError::NoShells {
            n_datasets: resolutions.len(),
        });
    }
    Ok(shells)
}

/// Build one ground-state model per comparator set of the shell.
///
/// sigma_i is fitted over the characterisation datasets plus the shell's
/// test datasets, so the Z-map step finds a recorded scale for every
/// dataset it sees. A comparator set below the hard minimum fails the
/// whole shell.
pub fn compute_models_for_shell(
    shell: &Shell,
    ensemble: &MaskedEnsemble,
    sigma_i_cutoff: f32,
) -> Result<BTreeMap<usize, GroundStateModel>, PipelineError> {
    let mut models = BTreeMap::new();
    for (&comparator_id, train) in &shell.train_dtags {
        if train.len() < 2 {
            return Err(PipelineError::InsufficientComparators {
                comparator_id,
                got: train.len(),
                needed: 2,
            });
        }
        let train_ensemble = ensemble.subset(train)?;
        // Test datasets without a map fail later, per dataset; the model
        // simply records no sigma_i for them.
        let mut with_tests = train.clone();
        for dtag in &shell.test_dtags {
            if !with_tests.contains(dtag) && ensemble.row(dtag).is_some() {
                with_tests.push(dtag.clone());
            }
        }
        let all_ensemble = ensemble.subset(&with_tests)?;
        let model = GroundStateModel::from_ensembles(
            comparator_id,
            &train_ensemble,
            &all_ensemble,
            sigma_i_cutoff,
        )?;
        models.insert(comparator_id, model);
    }
    Ok(models)
}

/// Results for one processed shell. Datasets that failed analysis appear
/// in the log's failure table, not in `dataset_results`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShellResult {
    pub res: f64,
    pub dataset_results: BTreeMap<String, DatasetResult>,
    pub log: ShellLog,
}

/// Process every test dataset of a shell.
///
/// Models are built once, then the test datasets fan out over the mapper;
/// one dataset failing never aborts its siblings. Only systemic problems
/// (insufficient comparators, shape mismatches while building models)
/// error out of the shell itself.
pub fn process_shell(
    shell: &Shell,
    xmaps: &BTreeMap<String, Vec<f32>>,
    grid: &Grid3D,
    partitioning: &Partitioning,
    config: &AnalysisConfig,
    mapper: &Mapper,
    sink: &dyn MapSink,
) -> Result<ShellResult, PipelineError> {
    let started = Instant::now();

    let mut shell_maps: BTreeMap<String, Vec<f32>> = BTreeMap::new();
    for dtag in &shell.all_dtags {
        if let Some(values) = xmaps.get(dtag) {
            shell_maps.insert(dtag.clone(), values.clone());
        }
    }
    let ensemble = MaskedEnsemble::from_aligned_maps(&shell_maps, grid, partitioning)?;

    let model_started = Instant::now();
    let models = compute_models_for_shell(shell, &ensemble, config.sigma_i_cutoff)?;
    let model_time_s = model_started.elapsed().as_secs_f64();

    let outcomes = mapper.map(shell.test_dtags.clone(), |dtag| {
        let observed = match xmaps.get(&dtag) {
            Some(values) => values,
            None => {
                return (
                    dtag.clone(),
                    Err(format!("no aligned map supplied for {}", dtag)),
                )
            }
        };
        let outcome = analyze_dataset(
            &dtag,
            &models,
            &shell.train_dtags,
            observed,
            grid,
            partitioning,
            config,
            sink,
        )
        .map_err(|e| e.to_string());
        (dtag, outcome)
    });

    let mut dataset_results = BTreeMap::new();
    let mut dataset_logs = BTreeMap::new();
    let mut failures = BTreeMap::new();
    for (dtag, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                dataset_logs.insert(dtag.clone(), result.log.clone());
                dataset_results.insert(dtag, result);
            }
            Err(reason) => {
                failures.insert(dtag, reason);
            }
        }
    }

    let log = ShellLog {
        res: shell.res,
        datasets: shell.all_dtags.clone(),
        dataset_logs,
        failures,
        model_time_s,
        total_time_s: started.elapsed().as_secs_f64(),
    };

    Ok(ShellResult {
        res: shell.res,
        dataset_results,
        log,
    })
}
