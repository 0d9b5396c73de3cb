//! Path integral policy improvement.
use super::base::{
    check_inputs, sample_gaussian, simulate_population, weighted_mean, Incumbent, Optimizer,
    OptimizerOutput, PlanDistribution,
};
use crate::{
    compute::ComputeContext,
    error::MpcError,
    record::{Record, RecordValue},
    simulator::TrajectorySimulator,
    BoxSpace,
};
use log::trace;
use ndarray::{Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Configuration of [`Pi2`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Pi2Config {
    /// The number of sequences sampled per agent and iteration.
    pub population_size: usize,

    /// The number of iterations.
    pub iterations: usize,

    /// Temperature of the exponentiated cost weighting.
    pub temperature: f32,

    /// Standard deviation of the exploration around the mean, in action units.
    pub noise_std: f32,
}

impl Default for Pi2Config {
    fn default() -> Self {
        Self {
            population_size: 500,
            iterations: 3,
            temperature: 1.0,
            noise_std: 1.0,
        }
    }
}

impl Pi2Config {
    /// Sets the population size.
    pub fn population_size(mut self, v: usize) -> Self {
        self.population_size = v;
        self
    }

    /// Sets the number of iterations.
    pub fn iterations(mut self, v: usize) -> Self {
        self.iterations = v;
        self
    }

    /// Sets the temperature.
    pub fn temperature(mut self, v: f32) -> Self {
        self.temperature = v;
        self
    }

    /// Sets the standard deviation of the sampling noise.
    pub fn noise_std(mut self, v: f32) -> Self {
        self.noise_std = v;
        self
    }
}

/// Path integral policy improvement.
///
/// Candidates are sampled around the current mean with a fixed standard deviation.
/// The new mean is their average weighted by `exp(-(c - c_min) / temperature)`, with
/// diverged candidates weighted zero.
pub struct Pi2 {
    config: Pi2Config,
}

impl Pi2 {
    /// Builds the optimizer.
    pub fn build(config: Pi2Config) -> Result<Self, MpcError> {
        if config.population_size == 0 || config.iterations == 0 {
            return Err(MpcError::ConfigurationError(
                "population_size and iterations must be positive".to_string(),
            ));
        }
        if !(config.temperature > 0.0) || !(config.noise_std >= 0.0) {
            return Err(MpcError::ConfigurationError(format!(
                "temperature must be positive and noise_std non-negative, got {} and {}",
                config.temperature, config.noise_std
            )));
        }
        Ok(Self { config })
    }
}

/// Normalised path integral weights. Returns `None` if every cost is infinite.
fn weights(costs: &[f32], temperature: f32) -> Option<Vec<f32>> {
    let c_min = costs.iter().cloned().filter(|c| c.is_finite()).reduce(f32::min)?;
    let w: Vec<f32> = costs
        .iter()
        .map(|&c| {
            if c.is_finite() {
                (-(c - c_min) / temperature).exp()
            } else {
                0.0
            }
        })
        .collect();
    let sum: f32 = w.iter().sum();
    Some(w.into_iter().map(|x| x / sum).collect())
}

impl Optimizer for Pi2 {
    fn name(&self) -> &str {
        "PI2"
    }

    fn population_size(&self) -> usize {
        self.config.population_size
    }

    fn optimize(
        &self,
        ctx: &mut ComputeContext,
        simulator: &TrajectorySimulator,
        action_space: &BoxSpace,
        start: ArrayView2<f32>,
        warm_start: &PlanDistribution,
    ) -> Result<OptimizerOutput, MpcError> {
        check_inputs(action_space, &start, warm_start)?;
        let (n, h, d) = warm_start.mean.dim();
        let pop = self.config.population_size;

        let mut mean = warm_start.mean.clone();
        let std = Array3::from_elem((n, h, d), self.config.noise_std);
        let mut incumbent = Incumbent::new(n, h, d);
        let mut n_diverged = 0;

        for _ in 0..self.config.iterations {
            let candidates = sample_gaussian(ctx, &mean, &std, pop, action_space);
            let out = simulate_population(ctx, simulator, start, &candidates)?;
            n_diverged += out.n_diverged;
            incumbent.update(&candidates, &out.costs, pop);

            let costs = out.costs.to_vec();
            for a in 0..n {
                let range = a * pop..(a + 1) * pop;
                if let Some(w) = weights(&costs[range.clone()], self.config.temperature) {
                    mean.index_axis_mut(Axis(0), a)
                        .assign(&weighted_mean(&candidates, range, &w));
                }
            }
        }
        trace!("PI2: {} diverged candidates", n_diverged);

        let (plans, costs) =
            incumbent.finish_with_mean(ctx, simulator, action_space, start, &mean)?;
        let mut record = Record::empty();
        record.insert("diverged_candidates", RecordValue::Scalar(n_diverged as f32));
        record.insert(
            "optimizer_iterations",
            RecordValue::Scalar(self.config.iterations as f32),
        );

        Ok(OptimizerOutput {
            plans,
            costs,
            distribution: PlanDistribution {
                mean,
                var: std.mapv(|s| s * s),
            },
            record,
        })
    }
}
