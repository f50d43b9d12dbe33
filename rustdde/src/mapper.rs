//! Processing backends.
//!
//! Every unit of work in the pipeline is a pure function from immutable
//! inputs to a serialisable result, so the only thing a backend decides is
//! where the closures run. Components hold a `Mapper` and never a concrete
//! pool, and results come back in input order regardless of completion
//! order.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

/// Dispatchable processing backend.
#[derive(Clone, Copy, Debug)]
pub enum Mapper {
    /// Run tasks on the calling thread, in order.
    Serial,
    /// Run tasks on a dedicated rayon pool of the given size.
    Threads(usize),
}

impl Mapper {
    /// Apply `f` to every item, returning results in item order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        match self {
            Mapper::Serial => items.into_iter().map(f).collect(),
            Mapper::Threads(num_threads) => ThreadPoolBuilder::new()
                .num_threads(*num_threads)
                .build()
                .unwrap()
                .install(|| items.into_par_iter().map(f).collect()),
        }
    }
}
