use crate::{optimizer::PlanDistribution, BoxSpace};
use ndarray::{Array1, Array2};

/// Mutable state of an MPC policy.
///
/// Created with the policy and reinitialised by [`PolicyState::reset`]. The plan
/// distribution always spans the configured planning horizon.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyState {
    /// Warm start of the next optimization.
    pub distribution: PlanDistribution,

    /// State of the Ornstein-Uhlenbeck exploration noise, `[num_agents, action_dim]`.
    pub noise: Array2<f32>,

    /// Control steps since the last reset.
    pub steps: usize,

    /// The number of resets.
    pub version: usize,

    init_mean: Array1<f32>,
    init_var: Array1<f32>,
}

impl PolicyState {
    /// Initial state for the given action space.
    ///
    /// The initial mean is the midpoint of the action space and the initial variance
    /// `(high - low)^2 / 16`, or one on unbounded dimensions.
    pub fn new(num_agents: usize, horizon: usize, action_space: &BoxSpace) -> Self {
        let init_mean = action_space.midpoint();
        let init_var: Array1<f32> = action_space
            .low()
            .iter()
            .zip(action_space.high().iter())
            .map(|(&l, &h)| {
                let r = h - l;
                if r.is_finite() {
                    r * r / 16.0
                } else {
                    1.0
                }
            })
            .collect();

        Self {
            distribution: PlanDistribution::constant(num_agents, horizon, &init_mean, &init_var),
            noise: Array2::zeros((num_agents, action_space.dim())),
            steps: 0,
            version: 0,
            init_mean,
            init_var,
        }
    }

    /// The planning horizon.
    pub fn horizon(&self) -> usize {
        self.distribution.horizon()
    }

    /// Drops the executed step of the plan and appends the initial distribution.
    pub fn shift(&mut self) {
        self.distribution.shift(&self.init_mean, &self.init_var);
    }

    /// Keeps `distribution` as the warm start of the next step.
    pub fn advance(&mut self, distribution: PlanDistribution) {
        self.distribution = distribution;
        self.shift();
        self.steps += 1;
    }

    /// Forgets the plan and the noise, and increments the version.
    pub fn reset(&mut self) {
        let (n, h, _) = self.distribution.mean.dim();
        self.distribution = PlanDistribution::constant(n, h, &self.init_mean, &self.init_var);
        self.noise.fill(0.0);
        self.steps = 0;
        self.version += 1;
    }
}
