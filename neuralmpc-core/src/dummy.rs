//! Collaborators used in tests.
use crate::{
    dynamics::{check_batch, Dynamics},
    error::MpcError,
    record::{Record, RecordValue, Recorder},
    BoxSpace, Env, RewardFunction, Step,
};
use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// Dynamics returning the input state unchanged.
pub struct IdentityDynamics {
    state_dim: usize,
    action_dim: usize,
}

impl IdentityDynamics {
    /// Constructs the model.
    pub fn new(state_dim: usize, action_dim: usize) -> Self {
        Self {
            state_dim,
            action_dim,
        }
    }
}

impl Dynamics for IdentityDynamics {
    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        check_batch(self, &states, &actions)?;
        Ok(states.to_owned())
    }
}

/// Dynamics adding a constant to every state component.
pub struct ShiftDynamics {
    state_dim: usize,
    action_dim: usize,
    shift: f32,
}

impl ShiftDynamics {
    /// Constructs the model.
    pub fn new(state_dim: usize, action_dim: usize, shift: f32) -> Self {
        Self {
            state_dim,
            action_dim,
            shift,
        }
    }
}

impl Dynamics for ShiftDynamics {
    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        check_batch(self, &states, &actions)?;
        Ok(&states + self.shift)
    }
}

/// Point mass integrating its action, `s' = s + dt * a` on the first `action_dim`
/// components.
pub struct IntegratorDynamics {
    state_dim: usize,
    action_dim: usize,
    dt: f32,
}

impl IntegratorDynamics {
    /// Constructs the model. `action_dim` must not exceed `state_dim`.
    pub fn new(state_dim: usize, action_dim: usize, dt: f32) -> Self {
        assert!(action_dim <= state_dim);
        Self {
            state_dim,
            action_dim,
            dt,
        }
    }
}

impl Dynamics for IntegratorDynamics {
    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        check_batch(self, &states, &actions)?;
        let mut next = states.to_owned();
        let mut head = next.slice_mut(ndarray::s![.., ..self.action_dim]);
        head.scaled_add(self.dt, &actions);
        Ok(next)
    }
}

/// Dynamics producing NaN for candidates whose first action component exceeds a
/// threshold. With a threshold below the action space every candidate diverges.
pub struct DivergingDynamics {
    state_dim: usize,
    action_dim: usize,
    threshold: f32,
}

impl DivergingDynamics {
    /// Constructs the model.
    pub fn new(state_dim: usize, action_dim: usize, threshold: f32) -> Self {
        Self {
            state_dim,
            action_dim,
            threshold,
        }
    }

    /// Every candidate diverges.
    pub fn always(state_dim: usize, action_dim: usize) -> Self {
        Self::new(state_dim, action_dim, f32::NEG_INFINITY)
    }
}

impl Dynamics for DivergingDynamics {
    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        check_batch(self, &states, &actions)?;
        let mut next = states.to_owned();
        for (mut row, a) in next.axis_iter_mut(Axis(0)).zip(actions.axis_iter(Axis(0))) {
            if a[0] > self.threshold {
                row.fill(f32::NAN);
            }
        }
        Ok(next)
    }
}

/// Dynamics returning the input state for its first `finite_calls` predictions and NaN
/// afterwards.
pub struct FlakyDynamics {
    state_dim: usize,
    action_dim: usize,
    finite_calls: usize,
    n_calls: AtomicUsize,
}

impl FlakyDynamics {
    /// Constructs the model.
    pub fn new(state_dim: usize, action_dim: usize, finite_calls: usize) -> Self {
        Self {
            state_dim,
            action_dim,
            finite_calls,
            n_calls: AtomicUsize::new(0),
        }
    }
}

impl Dynamics for FlakyDynamics {
    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        check_batch(self, &states, &actions)?;
        if self.n_calls.fetch_add(1, Ordering::Relaxed) < self.finite_calls {
            Ok(states.to_owned())
        } else {
            Ok(Array2::from_elem(states.raw_dim(), f32::NAN))
        }
    }
}

/// Reward always zero.
pub struct ZeroReward;

impl RewardFunction for ZeroReward {
    fn state_reward(&self, states: ArrayView2<f32>) -> Array1<f32> {
        Array1::zeros(states.nrows())
    }

    fn actions_reward(&self, actions: ArrayView2<f32>) -> Array1<f32> {
        Array1::zeros(actions.nrows())
    }
}

/// Negative squared distance of the state from a target, with a small action penalty.
pub struct QuadraticReward {
    target: Array1<f32>,
    action_weight: f32,
}

impl QuadraticReward {
    /// Constructs the reward.
    pub fn new(target: Array1<f32>, action_weight: f32) -> Self {
        Self {
            target,
            action_weight,
        }
    }
}

impl RewardFunction for QuadraticReward {
    fn state_reward(&self, states: ArrayView2<f32>) -> Array1<f32> {
        let d = &states - &self.target;
        -(&d * &d).sum_axis(Axis(1))
    }

    fn actions_reward(&self, actions: ArrayView2<f32>) -> Array1<f32> {
        -(&actions * &actions).sum_axis(Axis(1)) * self.action_weight
    }
}

/// Recorder sleeping on every write.
pub struct SlowRecorder {
    delay: Duration,
    n_written: usize,
}

impl SlowRecorder {
    /// Constructs the recorder.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            n_written: 0,
        }
    }

    /// The number of records written.
    pub fn n_written(&self) -> usize {
        self.n_written
    }
}

impl Recorder for SlowRecorder {
    fn write(&mut self, _record: Record) {
        std::thread::sleep(self.delay);
        self.n_written += 1;
    }
}

/// Configuration of [`IntegratorEnv`].
#[derive(Clone, Debug)]
pub struct IntegratorEnvConfig {
    /// The number of agents.
    pub num_agents: usize,

    /// Initial state of every agent.
    pub init_state: f32,

    /// Time step.
    pub dt: f32,

    /// Episodes are truncated after this number of steps.
    pub max_steps: usize,
}

impl Default for IntegratorEnvConfig {
    fn default() -> Self {
        Self {
            num_agents: 1,
            init_state: 1.0,
            dt: 0.5,
            max_steps: 10,
        }
    }
}

/// Environment of one-dimensional point masses following [`IntegratorDynamics`],
/// rewarded by `-s^2`.
pub struct IntegratorEnv {
    config: IntegratorEnvConfig,
    state: Array2<f32>,
    steps: usize,
    observation_space: BoxSpace,
    action_space: BoxSpace,
}

impl Env for IntegratorEnv {
    type Config = IntegratorEnvConfig;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            state: Array2::zeros((config.num_agents, 1)),
            steps: 0,
            observation_space: BoxSpace::uniform(1, f32::NEG_INFINITY, f32::INFINITY)?,
            action_space: BoxSpace::uniform(1, -1.0, 1.0)?,
        })
    }

    fn num_agents(&self) -> usize {
        self.config.num_agents
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    fn reset(&mut self) -> Result<Array2<f32>> {
        self.state.fill(self.config.init_state);
        self.steps = 0;
        Ok(self.state.clone())
    }

    fn step(&mut self, a: &Array2<f32>) -> Result<(Step, Record)> {
        let mut a = a.clone();
        self.action_space.clip(&mut a);
        self.state.scaled_add(self.config.dt, &a);
        self.steps += 1;

        let reward = self.state.iter().map(|s| -s * s).collect::<Vec<_>>();
        let n = self.config.num_agents;
        let is_truncated = vec![(self.steps >= self.config.max_steps) as i8; n];
        let record = Record::from_slice(&[("state", RecordValue::from(&self.state))]);
        let step = Step::new(self.state.clone(), a, reward, vec![0; n], is_truncated);
        Ok((step, record))
    }
}
