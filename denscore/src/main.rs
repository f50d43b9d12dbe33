use denscore::grid::lattice::Grid3D;
use denscore::grid::partitioning::{MaskConfig, Partitioning};
use denscore::simulation::ensemble::{flat_noise_ensemble, EnsembleConfig};
use denscore::statistics::masked::MaskedEnsemble;
use denscore::statistics::model::GroundStateModel;
use nalgebra::Point3;

fn main() {
    let grid = Grid3D::new([16, 16, 16], 1.0, [0.0; 3]);
    let partitioning = Partitioning::from_atoms(
        &grid,
        &[Point3::new(8.0, 8.0, 8.0)],
        &[],
        &MaskConfig::default(),
    );

    let maps = flat_noise_ensemble(&grid, &EnsembleConfig::default());
    let ensemble = MaskedEnsemble::from_aligned_maps(&maps, &grid, &partitioning).unwrap();
    let model = GroundStateModel::from_ensembles(0, &ensemble, &ensemble, 1.5).unwrap();

    println!("masked voxels: {}", ensemble.n_voxels());
    for (dtag, sigma_i) in &model.sigma_is {
        println!("{}: sigma_i = {:.4}", dtag, sigma_i);
    }
    let max_sigma = model.sigma_s_m.iter().cloned().fold(0.0f32, f32::max);
    println!("max sigma_s_m = {:.4}", max_sigma);
}
