use std::collections::BTreeMap;

use nalgebra::Point3;

use denscore::grid::lattice::Grid3D;
use denscore::grid::partitioning::{MaskConfig, Partitioning};
use denscore::simulation::ensemble::{flat_noise_ensemble, insert_blob, EnsembleConfig};
use rustdde::event::site::assign_sites;
use rustdde::io::NullSink;
use rustdde::mapper::Mapper;
use rustdde::pipeline::dataset::AnalysisConfig;
use rustdde::pipeline::shell::{process_shell, Shell};

fn main() {
    // A small synthetic screen: 30 ground-state datasets, two of which get
    // an artificial binding blob.
    let grid = Grid3D::new([24, 24, 24], 1.0, [0.0; 3]);
    let partitioning = Partitioning::from_atoms(
        &grid,
        &[
            Point3::new(12.0, 12.0, 12.0),
            Point3::new(8.0, 12.0, 14.0),
            Point3::new(16.0, 10.0, 10.0),
        ],
        &[],
        &MaskConfig::default(),
    );

    let mut maps = flat_noise_ensemble(&grid, &EnsembleConfig::default());
    let dtags: Vec<String> = maps.keys().cloned().collect();
    let bound_a = dtags[28].clone();
    let bound_b = dtags[29].clone();
    insert_blob(maps.get_mut(&bound_a).unwrap(), &grid, [9, 12, 13], 1, 4.0);
    insert_blob(maps.get_mut(&bound_b).unwrap(), &grid, [9, 12, 13], 1, 3.0);

    let train: Vec<String> = dtags[..28].to_vec();
    let mut train_map = BTreeMap::new();
    train_map.insert(0usize, train);
    let shell = Shell::new(1.8, vec![bound_a, bound_b], train_map);

    let config = AnalysisConfig::default();
    let result = process_shell(
        &shell,
        &maps,
        &grid,
        &partitioning,
        &config,
        &Mapper::Serial,
        &NullSink,
    )
    .unwrap();

    let mut events = Vec::new();
    for dataset in result.dataset_results.values() {
        events.extend(dataset.events.iter().cloned());
    }
    let sites = assign_sites(&mut events, config.max_site_distance_cutoff);

    println!("shell {:.2} A: {} datasets analysed", result.res, result.dataset_results.len());
    for event in &events {
        println!(
            "{} event {}: site {:?}, bdc {:.2}, peak z {:.1}, volume {:.0} A^3",
            event.dtag, event.event_idx, event.site_id, event.bdc, event.peak_z, event.volume
        );
    }
    println!("{} site(s) total", sites.len());

    let log_path = std::env::temp_dir().join(format!("shell_{:.2}_log.json", result.res));
    rustdde::io::write_json_log(&log_path, &result.log).unwrap();
    println!("shell log written to {}", log_path.display());
}
