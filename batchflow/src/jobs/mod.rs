//! Batch jobs built on the stage graph.

pub mod tornadoes;
#[cfg(test)]
mod tornadoes_tests;
