use crate::{
    compute::ComputeContext,
    error::MpcError,
    record::Record,
    simulator::{SimulationOutput, TrajectorySimulator},
    BoxSpace,
};
use log::debug;
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};

/// Distribution over action sequences, one Gaussian per agent, horizon step and
/// action component.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanDistribution {
    /// Mean, `[num_agents, horizon, action_dim]`.
    pub mean: Array3<f32>,

    /// Variance, `[num_agents, horizon, action_dim]`.
    pub var: Array3<f32>,
}

impl PlanDistribution {
    /// Builds a distribution from its mean and variance.
    pub fn new(mean: Array3<f32>, var: Array3<f32>) -> Result<Self, MpcError> {
        if mean.dim() != var.dim() {
            return Err(MpcError::ConfigurationError(format!(
                "mean and variance shapes differ: {:?} vs {:?}",
                mean.dim(),
                var.dim()
            )));
        }
        Ok(Self { mean, var })
    }

    /// A distribution with the same mean and variance at every agent and horizon step.
    pub fn constant(
        num_agents: usize,
        horizon: usize,
        mean: &Array1<f32>,
        var: &Array1<f32>,
    ) -> Self {
        let shape = (num_agents, horizon, mean.len());
        Self {
            mean: mean.broadcast(shape).map_or_else(|| Array3::zeros(shape), |m| m.to_owned()),
            var: var.broadcast(shape).map_or_else(|| Array3::zeros(shape), |v| v.to_owned()),
        }
    }

    /// The number of agents.
    pub fn num_agents(&self) -> usize {
        self.mean.dim().0
    }

    /// The planning horizon.
    pub fn horizon(&self) -> usize {
        self.mean.dim().1
    }

    /// Dimension of an action.
    pub fn action_dim(&self) -> usize {
        self.mean.dim().2
    }

    /// Drops the first horizon step and appends `mean` and `var` as the last one.
    ///
    /// The horizon is unchanged.
    pub fn shift(&mut self, mean: &Array1<f32>, var: &Array1<f32>) {
        let h = self.horizon();
        if h == 0 {
            return;
        }
        for (buf, tail) in [(&mut self.mean, mean), (&mut self.var, var)] {
            let rest = buf.slice(s![.., 1.., ..]).to_owned();
            buf.slice_mut(s![.., ..h - 1, ..]).assign(&rest);
            buf.slice_mut(s![.., h - 1, ..]).assign(tail);
        }
    }
}

/// Result of [`Optimizer::optimize`].
#[derive(Clone, Debug)]
pub struct OptimizerOutput {
    /// Best action sequence of each agent, `[num_agents, horizon, action_dim]`.
    pub plans: Array3<f32>,

    /// Predicted cost of each plan.
    pub costs: Array1<f32>,

    /// Refined distribution, used as the warm start of the next control step.
    pub distribution: PlanDistribution,

    /// Diagnostics.
    pub record: Record,
}

/// Searches low-cost action sequences.
pub trait Optimizer {
    /// Name of the strategy.
    fn name(&self) -> &str;

    /// The number of candidates per agent evaluated in one iteration.
    fn population_size(&self) -> usize;

    /// Whether candidates are drawn from the whole action space, which must then be
    /// bounded.
    fn requires_bounded_actions(&self) -> bool {
        false
    }

    /// Optimizes action sequences starting from `start`, `[num_agents, state_dim]`.
    fn optimize(
        &self,
        ctx: &mut ComputeContext,
        simulator: &TrajectorySimulator,
        action_space: &BoxSpace,
        start: ArrayView2<f32>,
        warm_start: &PlanDistribution,
    ) -> Result<OptimizerOutput, MpcError>;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn population_size(&self) -> usize {
        (**self).population_size()
    }

    fn requires_bounded_actions(&self) -> bool {
        (**self).requires_bounded_actions()
    }

    fn optimize(
        &self,
        ctx: &mut ComputeContext,
        simulator: &TrajectorySimulator,
        action_space: &BoxSpace,
        start: ArrayView2<f32>,
        warm_start: &PlanDistribution,
    ) -> Result<OptimizerOutput, MpcError> {
        (**self).optimize(ctx, simulator, action_space, start, warm_start)
    }
}

pub(super) fn check_inputs(
    action_space: &BoxSpace,
    start: &ArrayView2<f32>,
    warm_start: &PlanDistribution,
) -> Result<(), MpcError> {
    if start.nrows() != warm_start.num_agents() {
        return Err(MpcError::ConfigurationError(format!(
            "{} start states for a plan of {} agents",
            start.nrows(),
            warm_start.num_agents()
        )));
    }
    if action_space.dim() != warm_start.action_dim() {
        return Err(MpcError::ConfigurationError(format!(
            "action space of dimension {} for a plan of dimension {}",
            action_space.dim(),
            warm_start.action_dim()
        )));
    }
    if warm_start.horizon() == 0 {
        return Err(MpcError::ConfigurationError(
            "planning horizon must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Samples `pop` sequences per agent around `mean`, clipped into the action space.
///
/// Returns `[num_agents * pop, horizon, action_dim]`, agent-major.
pub(super) fn sample_gaussian(
    ctx: &mut ComputeContext,
    mean: &Array3<f32>,
    std: &Array3<f32>,
    pop: usize,
    action_space: &BoxSpace,
) -> Array3<f32> {
    let (n, h, d) = mean.dim();
    let mut samples: Array3<f32> = ctx.standard_normal((n * pop, h, d));
    for (i, mut sample) in samples.axis_iter_mut(Axis(0)).enumerate() {
        let agent = i / pop;
        sample *= &std.index_axis(Axis(0), agent);
        sample += &mean.index_axis(Axis(0), agent);
    }
    action_space.clip(&mut samples);
    samples
}

/// Simulates one population of candidates.
///
/// A population diverging entirely is not an error here: every candidate costs
/// [`f32::INFINITY`] and the incumbent of earlier iterations is kept.
pub(super) fn simulate_population(
    ctx: &mut ComputeContext,
    simulator: &TrajectorySimulator,
    start: ArrayView2<f32>,
    candidates: &Array3<f32>,
) -> Result<SimulationOutput, MpcError> {
    match simulator.simulate(ctx, start, candidates.view()) {
        Err(MpcError::DivergedRolloutError(msg)) => {
            debug!("Population discarded: {}", msg);
            let batch = candidates.dim().0;
            Ok(SimulationOutput {
                costs: Array1::from_elem(batch, f32::INFINITY),
                n_diverged: batch,
            })
        }
        other => other,
    }
}

/// Index of the first minimum cost within each agent's block of candidates.
pub(super) fn argmin_per_agent(costs: &Array1<f32>, n_agents: usize, pop: usize) -> Vec<usize> {
    (0..n_agents)
        .map(|a| {
            let mut best = a * pop;
            for i in a * pop..(a + 1) * pop {
                if costs[i] < costs[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// Keeps the best candidate seen so far for each agent.
pub(super) struct Incumbent {
    pub plans: Array3<f32>,
    pub costs: Array1<f32>,
}

impl Incumbent {
    pub fn new(n_agents: usize, horizon: usize, action_dim: usize) -> Self {
        Self {
            plans: Array3::zeros((n_agents, horizon, action_dim)),
            costs: Array1::from_elem(n_agents, f32::INFINITY),
        }
    }

    /// Replaces the incumbent of each agent by a strictly better candidate.
    pub fn update(&mut self, candidates: &Array3<f32>, costs: &Array1<f32>, pop: usize) {
        let n_agents = self.costs.len();
        for (a, i) in argmin_per_agent(costs, n_agents, pop).into_iter().enumerate() {
            if costs[i] < self.costs[a] {
                self.costs[a] = costs[i];
                self.plans
                    .index_axis_mut(Axis(0), a)
                    .assign(&candidates.index_axis(Axis(0), i));
            }
        }
    }

    /// Evaluates `mean` and returns it for agents where it is no worse than the incumbent.
    ///
    /// The mean is the lowest-variance candidate, so it wins ties.
    pub fn finish_with_mean(
        mut self,
        ctx: &mut ComputeContext,
        simulator: &TrajectorySimulator,
        action_space: &BoxSpace,
        start: ArrayView2<f32>,
        mean: &Array3<f32>,
    ) -> Result<(Array3<f32>, Array1<f32>), MpcError> {
        let mut mean = mean.clone();
        action_space.clip(&mut mean);
        let mean_costs = simulate_population(ctx, simulator, start, &mean)?.costs;

        for a in 0..self.costs.len() {
            if mean_costs[a] <= self.costs[a] && mean_costs[a].is_finite() {
                self.costs[a] = mean_costs[a];
                self.plans
                    .index_axis_mut(Axis(0), a)
                    .assign(&mean.index_axis(Axis(0), a));
            }
        }

        if let Some(a) = self.costs.iter().position(|c| !c.is_finite()) {
            return Err(MpcError::DivergedRolloutError(format!(
                "no finite action sequence was found for agent {}",
                a
            )));
        }
        Ok((self.plans, self.costs))
    }
}

/// Weighted average of the candidates of one agent, `[horizon, action_dim]`.
pub(super) fn weighted_mean(
    candidates: &Array3<f32>,
    range: std::ops::Range<usize>,
    weights: &[f32],
) -> Array2<f32> {
    let (_, h, d) = candidates.dim();
    let mut acc = Array2::<f32>::zeros((h, d));
    for (k, &w) in range.zip(weights.iter()) {
        if w > 0.0 {
            acc.scaled_add(w, &candidates.index_axis(Axis(0), k));
        }
    }
    acc
}
