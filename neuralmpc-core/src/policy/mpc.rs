//! Optimizer-backed MPC policy.
use super::{ActOutput, BasePolicy, ModelBasedPolicy, MpcPolicyConfig, PolicyState};
use crate::{
    compute::ComputeContext,
    dynamics::DynamicsHandle,
    error::MpcError,
    optimizer::{Cem, Optimizer, Pi2, RandomShooting},
    record::{AsyncRecorder, Record, RecordValue, Recorder},
    reward::RewardHandle,
    simulator::TrajectorySimulator,
    BoxSpace,
};
use log::{debug, info};
use ndarray::{ArrayView2, Axis};

/// [`MpcPolicy`] with random shooting.
pub type RandomShootingPolicy = MpcPolicy<RandomShooting>;

/// [`MpcPolicy`] with the cross-entropy method.
pub type CemPolicy = MpcPolicy<Cem>;

/// [`MpcPolicy`] with path integral policy improvement.
pub type Pi2Policy = MpcPolicy<Pi2>;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Model predictive control with a sampling-based optimizer.
///
/// # Control step
///
/// [`MpcPolicy::act`] does the following for a batch of observations at time step `t`:
///
/// 1. Checks the shape of the observations, their bounds if an observation space is
///    given, and `t` against the episode length if one is configured.
/// 2. Optimizes plans over the planning horizon, starting from the warm start kept in
///    [`PolicyState`].
/// 3. Takes the first action of each plan as the intended action and predicts the next
///    observation and the reward it leads to.
/// 4. If requested, adds exploration noise to the intended action and clips the result
///    into the action space.
/// 5. If requested, writes a record to the recorder.
/// 6. Shifts the refined distribution by one step and keeps it as the next warm start.
///
/// ```mermaid
/// graph LR
///     A[MpcPolicy]-->|start, warm start|B[Optimizer]
///     B -->|candidates|C[TrajectorySimulator]
///     C -->|states, actions|D[Dynamics]
///     C -->|states, actions|E[RewardFunction]
///     C -->|costs|B
///     B -->|plans, distribution|A
///     A -->|Record|F[AsyncRecorder]
/// ```
///
/// # Records
///
/// * `t`: time step.
/// * `planned_cost`: mean predicted cost of the plans.
/// * `planned_costs`: predicted cost of each plan.
/// * `action`, `intended_action`: actions with and without exploration noise.
/// * `planned_trajectory`: the plans.
/// * `predicted_reward`: reward predicted for the intended actions.
/// * `diverged_candidates`: candidates discarded by the simulator.
///
/// Records are written through an [`AsyncRecorder`], so a slow sink drops records
/// instead of delaying the action.
pub struct MpcPolicy<O: Optimizer = Box<dyn Optimizer>> {
    base: BasePolicy,
    simulator: TrajectorySimulator,
    optimizer: O,
    action_space: BoxSpace,
    observation_space: Option<BoxSpace>,
    config: MpcPolicyConfig,
    ctx: ComputeContext,
    state: PolicyState,
    recorder: Option<AsyncRecorder>,
}

impl<O: Optimizer> MpcPolicy<O> {
    /// Configuration of the policy.
    pub fn config(&self) -> &MpcPolicyConfig {
        &self.config
    }

    /// The optimizer.
    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    /// The action space.
    pub fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    /// The current state.
    pub fn state(&self) -> &PolicyState {
        &self.state
    }

    /// The number of records dropped by the logging sink.
    pub fn n_dropped_records(&self) -> usize {
        self.recorder.as_ref().map_or(0, |r| r.n_dropped())
    }

    fn check_observations(
        &self,
        observations: &ArrayView2<f32>,
        t: usize,
    ) -> Result<(), MpcError> {
        let expected = (self.config.num_agents, self.base.system_dynamics().state_dim());
        if observations.dim() != expected {
            return Err(MpcError::ConfigurationError(format!(
                "expected observations of shape {:?}, got {:?}",
                expected,
                observations.dim()
            )));
        }
        if observations.iter().any(|v| !v.is_finite()) {
            return Err(MpcError::BoundsViolationError(
                "observations are not finite".to_string(),
            ));
        }
        if let Some(space) = &self.observation_space {
            if !space.contains(observations) {
                return Err(MpcError::BoundsViolationError(format!(
                    "observations out of the observation space: {}",
                    observations
                )));
            }
        }
        if let Some(len) = self.config.episode_length {
            if t >= len {
                return Err(MpcError::ConfigurationError(format!(
                    "time step {} is beyond the episode length {}, reset the policy",
                    t, len
                )));
            }
        }
        Ok(())
    }
}

impl<O: Optimizer> ModelBasedPolicy for MpcPolicy<O> {
    fn system_dynamics(&self) -> &DynamicsHandle {
        self.base.system_dynamics()
    }

    fn act(
        &mut self,
        observations: ArrayView2<f32>,
        t: usize,
        exploration_noise: bool,
        log_results: bool,
    ) -> Result<ActOutput, MpcError> {
        self.check_observations(&observations, t)?;

        let out = self.optimizer.optimize(
            &mut self.ctx,
            &self.simulator,
            &self.action_space,
            observations,
            &self.state.distribution,
        )?;
        let intended_action = out.plans.index_axis(Axis(1), 0).to_owned();
        let (predicted_observation, predicted_reward) =
            self.simulator.one_step(observations, intended_action.view())?;

        let action = if exploration_noise {
            let noise = self
                .config
                .exploration
                .sample(self.ctx.noise_rng(), &mut self.state.noise);
            let mut action = &intended_action + &noise;
            self.action_space.clip(&mut action);
            action
        } else {
            intended_action.clone()
        };
        if !self.action_space.contains(&action) {
            return Err(MpcError::BoundsViolationError(format!(
                "selected action out of the action space: {}",
                action
            )));
        }

        if log_results {
            let planned_cost = out.costs.mean().unwrap_or(f32::NAN);
            debug!("t = {}, planned cost = {}", t, planned_cost);
            if let Some(recorder) = &mut self.recorder {
                let mut record = out.record.clone();
                record.insert("t", RecordValue::Scalar(t as f32));
                record.insert("planned_cost", RecordValue::Scalar(planned_cost));
                record.insert("planned_costs", (&out.costs).into());
                record.insert("action", (&action).into());
                record.insert("intended_action", (&intended_action).into());
                record.insert("planned_trajectory", (&out.plans).into());
                record.insert("predicted_reward", (&predicted_reward).into());
                recorder.write(record);
            }
        }

        self.state.advance(out.distribution);

        Ok(ActOutput {
            action,
            intended_action,
            predicted_observation,
            predicted_reward,
            planned_cost: out.costs,
            plan: out.plans,
        })
    }

    fn reset(&mut self) -> Result<(), MpcError> {
        self.state.reset();
        self.ctx.reseed();
        Ok(())
    }
}

/// Builds [`MpcPolicy`].
///
/// ```rust
/// use neuralmpc_core::{
///     dummy::{IntegratorDynamics, QuadraticReward},
///     BoxSpace, ModelBasedPolicy, MpcPolicyBuilder, MpcPolicyConfig, OptimizerConfig,
/// };
/// use ndarray::array;
/// use std::sync::Arc;
///
/// let config = MpcPolicyConfig::default()
///     .planning_horizon(5)
///     .optimizer(OptimizerConfig::from_name("CEM").unwrap().population_size(100));
/// let mut policy = MpcPolicyBuilder::new(config)
///     .dynamics(Arc::new(IntegratorDynamics::new(1, 1, 0.1)))
///     .reward(Arc::new(QuadraticReward::new(array![0.0], 0.01)))
///     .action_space(BoxSpace::uniform(1, -1.0, 1.0).unwrap())
///     .build()
///     .unwrap();
///
/// policy.reset().unwrap();
/// let out = policy.act(array![[0.5f32]].view(), 0, false, false).unwrap();
/// assert!(out.action[[0, 0]] < 0.0);
/// ```
pub struct MpcPolicyBuilder {
    config: MpcPolicyConfig,
    dynamics: Option<DynamicsHandle>,
    reward: Option<RewardHandle>,
    action_space: Option<BoxSpace>,
    observation_space: Option<BoxSpace>,
    recorder: Option<Box<dyn Recorder + Send>>,
}

impl MpcPolicyBuilder {
    /// Starts building a policy with the given configuration.
    pub fn new(config: MpcPolicyConfig) -> Self {
        Self {
            config,
            dynamics: None,
            reward: None,
            action_space: None,
            observation_space: None,
            recorder: None,
        }
    }

    /// Sets the dynamics model.
    pub fn dynamics(mut self, v: DynamicsHandle) -> Self {
        self.dynamics = Some(v);
        self
    }

    /// Sets the reward function.
    pub fn reward(mut self, v: RewardHandle) -> Self {
        self.reward = Some(v);
        self
    }

    /// Sets the action space, used for sampling and clipping.
    pub fn action_space(mut self, v: BoxSpace) -> Self {
        self.action_space = Some(v);
        self
    }

    /// Sets the observation space. Observations outside it are rejected.
    pub fn observation_space(mut self, v: BoxSpace) -> Self {
        self.observation_space = Some(v);
        self
    }

    /// Sets the logging sink. It runs on a worker thread of its own.
    pub fn recorder<R: Recorder + Send + 'static>(mut self, v: R) -> Self {
        self.recorder = Some(Box::new(v));
        self
    }

    /// Builds the policy with the optimizer of the configuration.
    pub fn build(self) -> Result<MpcPolicy, MpcError> {
        let optimizer = self.config.optimizer.build()?;
        self.build_with(optimizer)
    }

    /// Builds the policy with the given optimizer, ignoring the one of the configuration.
    pub fn build_with<O: Optimizer>(self, optimizer: O) -> Result<MpcPolicy<O>, MpcError> {
        self.config.validate()?;
        let base = BasePolicy::new(self.dynamics)?;
        let dynamics = base.system_dynamics().clone();
        let reward = self.reward.ok_or_else(|| {
            MpcError::ConfigurationError("a reward function is required".to_string())
        })?;
        let action_space = self.action_space.ok_or_else(|| {
            MpcError::ConfigurationError("an action space is required".to_string())
        })?;
        if action_space.dim() != dynamics.action_dim() {
            return Err(MpcError::ConfigurationError(format!(
                "action space of dimension {} for a model with actions of dimension {}",
                action_space.dim(),
                dynamics.action_dim()
            )));
        }
        if optimizer.requires_bounded_actions() && !action_space.is_bounded() {
            return Err(MpcError::ConfigurationError(format!(
                "{} samples the whole action space, which must be bounded",
                optimizer.name()
            )));
        }
        if let Some(space) = &self.observation_space {
            if space.dim() != dynamics.state_dim() {
                return Err(MpcError::ConfigurationError(format!(
                    "observation space of dimension {} for a model with states of dimension {}",
                    space.dim(),
                    dynamics.state_dim()
                )));
            }
        }

        let state = PolicyState::new(
            self.config.num_agents,
            self.config.planning_horizon,
            &action_space,
        );
        let recorder = self
            .recorder
            .map(|r| AsyncRecorder::spawn(r, &self.config.logging));
        info!(
            "MPC policy with {}, horizon {}, {} candidates per agent",
            optimizer.name(),
            self.config.planning_horizon,
            optimizer.population_size()
        );

        Ok(MpcPolicy {
            simulator: TrajectorySimulator::new(dynamics, reward, self.config.rollout_mode),
            base,
            optimizer,
            action_space,
            observation_space: self.observation_space,
            ctx: ComputeContext::new(self.config.seed),
            config: self.config,
            state,
            recorder,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dummy::{
            DivergingDynamics, IdentityDynamics, IntegratorDynamics, QuadraticReward, ZeroReward,
        },
        optimizer::OptimizerConfig,
        policy::ExplorationNoiseConfig,
    };
    use ndarray::{array, Array2};
    use std::sync::{Arc, Mutex};

    struct SharedRecorder(Arc<Mutex<Vec<Record>>>);

    impl Recorder for SharedRecorder {
        fn write(&mut self, record: Record) {
            self.0.lock().unwrap().push(record);
        }
    }

    fn space() -> BoxSpace {
        BoxSpace::uniform(1, -1.0, 1.0).unwrap()
    }

    fn integrator_policy(optimizer: &str) -> MpcPolicy {
        let config = MpcPolicyConfig::default()
            .num_agents(2)
            .planning_horizon(5)
            .optimizer(OptimizerConfig::from_name(optimizer).unwrap().population_size(100))
            .seed(3);
        MpcPolicyBuilder::new(config)
            .dynamics(Arc::new(IntegratorDynamics::new(1, 1, 0.5)))
            .reward(Arc::new(QuadraticReward::new(array![0.0], 0.01)))
            .action_space(space())
            .build()
            .unwrap()
    }

    const OPTIMIZERS: [&str; 3] = ["RandomShooting", "CEM", "PI2"];

    #[test]
    fn test_actions_within_bounds() {
        for name in OPTIMIZERS {
            let mut policy = integrator_policy(name);
            policy.reset().unwrap();
            let mut obs = array![[3.0f32], [-0.2]];
            for t in 0..10 {
                let out = policy.act(obs.view(), t, t % 2 == 0, false).unwrap();
                assert!(space().contains(&out.action), "{}: {}", name, out.action);
                assert_eq!(out.action.dim(), (2, 1));
                assert_eq!(out.predicted_observation.dim(), (2, 1));
                assert_eq!(out.predicted_reward.len(), 2);
                obs = out.predicted_observation;
            }
        }
    }

    #[test]
    fn test_reset_makes_act_reproducible() {
        for name in OPTIMIZERS {
            let mut policy = integrator_policy(name);
            let obs = array![[0.7f32], [-0.4]];

            policy.reset().unwrap();
            let a = policy.act(obs.view(), 0, false, false).unwrap();
            let b = policy.act(obs.view(), 1, false, false).unwrap();

            policy.reset().unwrap();
            let a_ = policy.act(obs.view(), 0, false, false).unwrap();
            let b_ = policy.act(obs.view(), 1, false, false).unwrap();

            assert_eq!(a.action, a_.action);
            assert_eq!(a.predicted_observation, a_.predicted_observation);
            assert_eq!(a.predicted_reward, a_.predicted_reward);
            assert_eq!(b.action, b_.action);
            assert_eq!(policy.state().version, 2);
        }
    }

    #[test]
    fn test_exploration_noise_is_bounded_and_reproducible() {
        let bound = 0.3;
        let config = MpcPolicyConfig::default()
            .planning_horizon(5)
            .optimizer(OptimizerConfig::from_name("CEM").unwrap().population_size(100))
            .exploration(ExplorationNoiseConfig::Gaussian { std: 0.2, bound });
        let mut policy = MpcPolicyBuilder::new(config)
            .dynamics(Arc::new(IntegratorDynamics::new(1, 1, 0.5)))
            .reward(Arc::new(QuadraticReward::new(array![0.0], 0.01)))
            .action_space(BoxSpace::uniform(1, -2.0, 2.0).unwrap())
            .build()
            .unwrap();
        let obs = array![[0.0f32]];

        policy.reset().unwrap();
        let plain = policy.act(obs.view(), 0, false, false).unwrap();
        policy.reset().unwrap();
        let noisy = policy.act(obs.view(), 0, true, false).unwrap();
        policy.reset().unwrap();
        let noisy_ = policy.act(obs.view(), 0, true, false).unwrap();

        // Noise does not change planning.
        assert_eq!(plain.intended_action, noisy.intended_action);
        assert_eq!(plain.predicted_observation, noisy.predicted_observation);

        let diff = &noisy.action - &plain.action;
        assert!(diff.iter().all(|d| d.abs() <= bound + 1e-6));
        assert!(diff.iter().any(|d| *d != 0.0));
        assert_eq!(noisy.action, noisy_.action);
    }

    #[test]
    fn test_zero_cost_plans() {
        for name in OPTIMIZERS {
            let config = MpcPolicyConfig::default()
                .planning_horizon(40)
                .optimizer(OptimizerConfig::from_name(name).unwrap().population_size(200));
            let mut policy = MpcPolicyBuilder::new(config)
                .dynamics(Arc::new(IdentityDynamics::new(3, 2)))
                .reward(Arc::new(ZeroReward))
                .action_space(BoxSpace::new(vec![-1.0, 0.0], vec![1.0, 2.0]).unwrap())
                .build()
                .unwrap();
            policy.reset().unwrap();

            let out = policy
                .act(array![[0.1f32, 0.2, 0.3]].view(), 0, false, true)
                .unwrap();
            assert_eq!(out.planned_cost, array![0.0f32]);
            assert_eq!(out.plan.dim(), (1, 40, 2));
            assert!(policy.action_space().contains(&out.action));
        }
    }

    #[test]
    fn test_all_candidates_diverge() {
        for name in OPTIMIZERS {
            let config = MpcPolicyConfig::default()
                .planning_horizon(4)
                .optimizer(OptimizerConfig::from_name(name).unwrap().population_size(20));
            let mut policy = MpcPolicyBuilder::new(config)
                .dynamics(Arc::new(DivergingDynamics::always(1, 1)))
                .reward(Arc::new(ZeroReward))
                .action_space(space())
                .build()
                .unwrap();
            policy.reset().unwrap();

            let result = policy.act(array![[0.0f32]].view(), 0, false, false);
            assert!(
                matches!(result, Err(MpcError::DivergedRolloutError(_))),
                "{}",
                name
            );
            assert_eq!(policy.state().steps, 0);
        }
    }

    #[test]
    fn test_warm_start_keeps_horizon() {
        let mut policy = integrator_policy("CEM");
        policy.reset().unwrap();
        let mut obs = array![[1.0f32], [-1.0]];
        for t in 0..30 {
            let out = policy.act(obs.view(), t, true, false).unwrap();
            obs = out.predicted_observation;
            assert_eq!(policy.state().horizon(), 5);
            assert_eq!(policy.state().distribution.mean.dim(), (2, 5, 1));
            assert_eq!(policy.state().steps, t + 1);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let config = MpcPolicyConfig::default()
            .planning_horizon(3)
            .episode_length(2)
            .optimizer(OptimizerConfig::from_name("RS").unwrap().population_size(10));
        let mut policy = MpcPolicyBuilder::new(config)
            .dynamics(Arc::new(IntegratorDynamics::new(1, 1, 0.5)))
            .reward(Arc::new(ZeroReward))
            .action_space(space())
            .observation_space(BoxSpace::uniform(1, -5.0, 5.0).unwrap())
            .build()
            .unwrap();
        policy.reset().unwrap();

        let result = policy.act(array![[0.0f32, 1.0]].view(), 0, false, false);
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));

        let result = policy.act(array![[6.0f32]].view(), 0, false, false);
        assert!(matches!(result, Err(MpcError::BoundsViolationError(_))));

        let result = policy.act(array![[f32::NAN]].view(), 0, false, false);
        assert!(matches!(result, Err(MpcError::BoundsViolationError(_))));

        let result = policy.act(array![[0.0f32]].view(), 2, false, false);
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));

        assert!(policy.act(array![[0.0f32]].view(), 1, false, false).is_ok());
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = MpcPolicyBuilder::new(MpcPolicyConfig::default())
            .reward(Arc::new(ZeroReward))
            .action_space(space())
            .build();
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));

        let result = MpcPolicyBuilder::new(MpcPolicyConfig::default())
            .dynamics(Arc::new(IdentityDynamics::new(1, 2)))
            .reward(Arc::new(ZeroReward))
            .action_space(space())
            .build();
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));
    }

    #[test]
    fn test_unbounded_actions() {
        let unbounded = BoxSpace::uniform(1, f32::NEG_INFINITY, f32::INFINITY).unwrap();
        let build = |name: &str| {
            let config = MpcPolicyConfig::default()
                .planning_horizon(3)
                .optimizer(OptimizerConfig::from_name(name).unwrap().population_size(20));
            MpcPolicyBuilder::new(config)
                .dynamics(Arc::new(IntegratorDynamics::new(1, 1, 0.5)))
                .reward(Arc::new(QuadraticReward::new(array![0.0], 0.01)))
                .action_space(unbounded.clone())
                .build()
        };

        assert!(matches!(
            build("RandomShooting"),
            Err(MpcError::ConfigurationError(_))
        ));
        let mut policy = build("PI2").unwrap();
        assert!(policy.act(array![[1.0f32]].view(), 0, false, false).is_ok());
    }

    #[test]
    fn test_typed_policy() {
        use crate::optimizer::{Pi2, Pi2Config};

        let config = MpcPolicyConfig::default().planning_horizon(3);
        let mut policy: crate::Pi2Policy = MpcPolicyBuilder::new(config)
            .dynamics(Arc::new(IntegratorDynamics::new(1, 1, 0.5)))
            .reward(Arc::new(ZeroReward))
            .action_space(space())
            .build_with(Pi2::build(Pi2Config::default().population_size(10)).unwrap())
            .unwrap();
        policy.reset().unwrap();
        assert_eq!(policy.optimizer().name(), "PI2");
        assert!(policy.act(array![[0.0f32]].view(), 0, false, false).is_ok());
    }

    #[test]
    fn test_records() {
        let buf = Arc::new(Mutex::new(vec![]));
        {
            let mut policy = {
                let config = MpcPolicyConfig::default()
                    .planning_horizon(4)
                    .optimizer(OptimizerConfig::from_name("CEM").unwrap().population_size(50));
                MpcPolicyBuilder::new(config)
                    .dynamics(Arc::new(IntegratorDynamics::new(1, 1, 0.5)))
                    .reward(Arc::new(QuadraticReward::new(array![0.0], 0.01)))
                    .action_space(space())
                    .recorder(SharedRecorder(buf.clone()))
                    .build()
                    .unwrap()
            };
            policy.reset().unwrap();
            let obs: Array2<f32> = array![[0.5]];
            policy.act(obs.view(), 0, false, true).unwrap();
            policy.act(obs.view(), 1, false, false).unwrap();
            policy.act(obs.view(), 2, true, true).unwrap();
            assert_eq!(policy.n_dropped_records(), 0);
        }

        let buf = buf.lock().unwrap();
        assert_eq!(buf.len(), 2);
        let record = &buf[1];
        assert_eq!(record.get_scalar("t").unwrap(), 2.0);
        for key in [
            "planned_cost",
            "planned_costs",
            "action",
            "intended_action",
            "planned_trajectory",
            "predicted_reward",
            "diverged_candidates",
        ] {
            assert!(record.get(key).is_some(), "{}", key);
        }
        let (_, shape) = record.get_array3("planned_trajectory").unwrap();
        assert_eq!(shape, [1, 4, 1]);
    }
}
