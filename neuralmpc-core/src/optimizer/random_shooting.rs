//! Random shooting.
use super::base::{check_inputs, Incumbent, Optimizer, OptimizerOutput, PlanDistribution};
use crate::{
    compute::ComputeContext,
    error::MpcError,
    record::{Record, RecordValue},
    simulator::TrajectorySimulator,
    BoxSpace,
};
use log::trace;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Configuration of [`RandomShooting`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RandomShootingConfig {
    /// The number of sequences sampled per agent.
    pub population_size: usize,
}

impl Default for RandomShootingConfig {
    fn default() -> Self {
        Self {
            population_size: 1000,
        }
    }
}

impl RandomShootingConfig {
    /// Sets the number of sequences sampled per agent.
    pub fn population_size(mut self, v: usize) -> Self {
        self.population_size = v;
        self
    }
}

/// Samples action sequences uniformly from the action space and keeps the cheapest.
///
/// The warm start only fixes the shape of the plan; the returned distribution has the
/// best sequence as its mean and keeps the warm-start variance.
pub struct RandomShooting {
    config: RandomShootingConfig,
}

impl RandomShooting {
    /// Builds the optimizer.
    pub fn build(config: RandomShootingConfig) -> Result<Self, MpcError> {
        if config.population_size == 0 {
            return Err(MpcError::ConfigurationError(
                "population_size must be positive".to_string(),
            ));
        }
        Ok(Self { config })
    }
}

impl Optimizer for RandomShooting {
    fn name(&self) -> &str {
        "RandomShooting"
    }

    fn population_size(&self) -> usize {
        self.config.population_size
    }

    fn requires_bounded_actions(&self) -> bool {
        true
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

        let candidates = action_space
            .sample(ctx.rng(), n * pop * h)?
            .into_shape((n * pop, h, d))
            .map_err(|e| MpcError::ConfigurationError(e.to_string()))?;
        let out = simulator.simulate(ctx, start, candidates.view())?;
        trace!("Random shooting: {} diverged of {}", out.n_diverged, n * pop);

        let mut incumbent = Incumbent::new(n, h, d);
        incumbent.update(&candidates, &out.costs, pop);
        if let Some(a) = incumbent.costs.iter().position(|c| !c.is_finite()) {
            return Err(MpcError::DivergedRolloutError(format!(
                "every candidate of agent {} diverged",
                a
            )));
        }

        let distribution = PlanDistribution {
            mean: incumbent.plans.clone(),
            var: warm_start.var.clone(),
        };
        let record = Record::from_slice(&[(
            "diverged_candidates",
            RecordValue::Scalar(out.n_diverged as f32),
        )]);

        Ok(OptimizerOutput {
            plans: incumbent.plans,
            costs: incumbent.costs,
            distribution,
            record,
        })
    }
}
