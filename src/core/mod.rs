use rand::distr::{Alphanumeric, SampleString};

pub mod chunk;

pub mod flow;

pub mod item;

pub mod job;

pub mod paging;

pub mod parameters;

pub mod repository;

pub mod step;

pub mod tasklet;

/// Generates a random name consisting of alphanumeric characters.
///
/// # Returns
///
/// A `String` containing the generated random name.
fn build_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}
