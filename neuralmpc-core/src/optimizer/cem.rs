//! Cross-entropy method.
use super::base::{
    check_inputs, sample_gaussian, simulate_population, Incumbent, Optimizer, OptimizerOutput,
    PlanDistribution,
};
use crate::{
    compute::ComputeContext,
    error::MpcError,
    record::{Record, RecordValue},
    simulator::TrajectorySimulator,
    BoxSpace,
};
use log::trace;
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Configuration of [`Cem`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CemConfig {
    /// The number of sequences sampled per agent and iteration.
    pub population_size: usize,

    /// The number of lowest-cost sequences the distribution is refitted to.
    pub num_elites: usize,

    /// The maximum number of iterations.
    pub iterations: usize,

    /// Weight of the previous distribution when refitting.
    pub alpha: f32,

    /// Iterations stop once the largest variance falls below this value.
    pub epsilon: f32,
}

impl Default for CemConfig {
    fn default() -> Self {
        Self {
            population_size: 500,
            num_elites: 50,
            iterations: 5,
            alpha: 0.1,
            epsilon: 0.001,
        }
    }
}

impl CemConfig {
    /// Sets the population size.
    pub fn population_size(mut self, v: usize) -> Self {
        self.population_size = v;
        self
    }

    /// Sets the number of elites.
    pub fn num_elites(mut self, v: usize) -> Self {
        self.num_elites = v;
        self
    }

    /// Sets the maximum number of iterations.
    pub fn iterations(mut self, v: usize) -> Self {
        self.iterations = v;
        self
    }

    /// Sets the smoothing weight.
    pub fn alpha(mut self, v: f32) -> Self {
        self.alpha = v;
        self
    }

    /// Sets the variance threshold of early stopping.
    pub fn epsilon(mut self, v: f32) -> Self {
        self.epsilon = v;
        self
    }
}

/// Cross-entropy method.
///
/// Each iteration samples `population_size` sequences per agent from a Gaussian, clipped
/// into the action space, and refits the Gaussian to the `num_elites` cheapest ones:
///
/// ```text
/// mean <- alpha * mean + (1 - alpha) * elite_mean
/// var  <- alpha * var  + (1 - alpha) * elite_var
/// ```
///
/// The sampling variance is limited so that two standard deviations around the mean
/// stay inside the action bounds. Diverged candidates are never elites.
pub struct Cem {
    config: CemConfig,
}

impl Cem {
    /// Builds the optimizer.
    pub fn build(config: CemConfig) -> Result<Self, MpcError> {
        if config.population_size == 0 || config.iterations == 0 {
            return Err(MpcError::ConfigurationError(
                "population_size and iterations must be positive".to_string(),
            ));
        }
        if config.num_elites == 0 || config.num_elites > config.population_size {
            return Err(MpcError::ConfigurationError(format!(
                "num_elites must be in 1..={}, got {}",
                config.population_size, config.num_elites
            )));
        }
        if !(0.0..1.0).contains(&config.alpha) {
            return Err(MpcError::ConfigurationError(format!(
                "alpha must be in [0, 1), got {}",
                config.alpha
            )));
        }
        Ok(Self { config })
    }

    /// Variance limited by the distance of the mean to the bounds.
    fn constrained_var(
        &self,
        action_space: &BoxSpace,
        mean: &Array3<f32>,
        var: &Array3<f32>,
    ) -> Array3<f32> {
        let mut out = var.clone();
        Zip::indexed(&mut out).and(mean).for_each(|(_, _, j), v, &m| {
            let lb = (m - action_space.low()[j]) / 2.0;
            let ub = (action_space.high()[j] - m) / 2.0;
            *v = v.min(lb * lb).min(ub * ub);
        });
        out
    }
}

/// Mean and population variance of the elites, or `None` if none is finite.
fn fit_elites(
    candidates: &Array3<f32>,
    costs: &[f32],
    offset: usize,
    num_elites: usize,
) -> Option<(Array2<f32>, Array2<f32>)> {
    let mut order: Vec<usize> = (0..costs.len()).filter(|&k| costs[k].is_finite()).collect();
    order.sort_by(|&a, &b| costs[a].total_cmp(&costs[b]).then(a.cmp(&b)));
    order.truncate(num_elites);
    if order.is_empty() {
        return None;
    }

    let elites = candidates.select(
        Axis(0),
        &order.iter().map(|k| offset + k).collect::<Vec<_>>(),
    );
    let mean = elites.mean_axis(Axis(0))?;
    let var = elites.var_axis(Axis(0), 0.0);
    Some((mean, var))
}

impl Optimizer for Cem {
    fn name(&self) -> &str {
        "CEM"
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
        let alpha = self.config.alpha;

        let mut mean = warm_start.mean.clone();
        let mut var = warm_start.var.clone();
        let mut incumbent = Incumbent::new(n, h, d);
        let mut n_diverged = 0;
        let mut iterations = 0;

        for _ in 0..self.config.iterations {
            if var.fold(0.0f32, |acc, &v| acc.max(v)) < self.config.epsilon {
                break;
            }
            let std = self
                .constrained_var(action_space, &mean, &var)
                .mapv(|v| v.max(0.0).sqrt());
            let candidates = sample_gaussian(ctx, &mean, &std, pop, action_space);
            let out = simulate_population(ctx, simulator, start, &candidates)?;
            n_diverged += out.n_diverged;
            iterations += 1;
            incumbent.update(&candidates, &out.costs, pop);

            let costs = out.costs.to_vec();
            for a in 0..n {
                let block = &costs[a * pop..(a + 1) * pop];
                if let Some((elite_mean, elite_var)) =
                    fit_elites(&candidates, block, a * pop, self.config.num_elites)
                {
                    let mut m = mean.index_axis_mut(Axis(0), a);
                    m *= alpha;
                    m.scaled_add(1.0 - alpha, &elite_mean);
                    let mut v = var.index_axis_mut(Axis(0), a);
                    v *= alpha;
                    v.scaled_add(1.0 - alpha, &elite_var);
                }
            }
        }
        trace!("CEM: {} iterations, {} diverged candidates", iterations, n_diverged);

        let (plans, costs) =
            incumbent.finish_with_mean(ctx, simulator, action_space, start, &mean)?;
        let mut record = Record::empty();
        record.insert("diverged_candidates", RecordValue::Scalar(n_diverged as f32));
        record.insert("optimizer_iterations", RecordValue::Scalar(iterations as f32));

        Ok(OptimizerOutput {
            plans,
            costs,
            distribution: PlanDistribution { mean, var },
            record,
        })
    }
}
