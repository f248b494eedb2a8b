//! Data-parallel transforms used by batch jobs.

mod combine;
mod partition;

pub use combine::{combine_per_key, count_by_value, Combiner, Count};
pub use partition::Partitioned;
