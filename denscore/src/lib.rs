// src/lib.rs

// grid module
pub mod grid {
    pub mod lattice;
    pub mod partitioning;
}

// statistics module
pub mod statistics {
    pub mod masked;
    pub mod model;
    pub mod zmap;
}

// algorithm module
pub mod algorithm {
    pub mod utility;
}

// simulation module
pub mod simulation {
    pub mod ensemble;
}

// Re-export commonly used types
pub use grid::lattice::Grid3D;
pub use grid::partitioning::{MaskConfig, Partitioning};
pub use statistics::masked::MaskedEnsemble;
pub use statistics::model::{GroundStateModel, ModelError};
pub use statistics::zmap::{Zmap, ZmapStats};
