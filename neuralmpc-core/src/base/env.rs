//! Environment.
use super::{BoxSpace, Step};
use crate::record::Record;
use anyhow::Result;
use ndarray::Array2;

/// Represents an environment with a batch of agents acting in parallel.
///
/// Observations and actions carry one row per agent.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// The number of agents stepped together.
    fn num_agents(&self) -> usize;

    /// Bounds of an observation of a single agent.
    fn observation_space(&self) -> &BoxSpace;

    /// Bounds of an action of a single agent, used for clipping.
    fn action_space(&self) -> &BoxSpace;

    /// Resets the environment and returns the initial observations.
    fn reset(&mut self) -> Result<Array2<f32>>;

    /// Performs an environment step.
    fn step(&mut self, a: &Array2<f32>) -> Result<(Step, Record)>;
}
