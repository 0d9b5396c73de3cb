use super::{angle_normalize, integrate, MAX_SPEED, MAX_TORQUE};
use anyhow::{ensure, Result};
use log::trace;
use ndarray::{Array1, Array2};
use neuralmpc_core::{
    record::{Record, RecordValue},
    BoxSpace, Env, Step,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Configuration of [`PendulumEnv`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PendulumEnvConfig {
    /// The number of pendulums simulated together.
    pub num_agents: usize,

    /// Episodes are truncated after this number of steps.
    pub max_steps: usize,

    /// Gravity.
    pub g: f32,
}

impl Default for PendulumEnvConfig {
    fn default() -> Self {
        Self {
            num_agents: 1,
            max_steps: 200,
            g: super::GRAVITY,
        }
    }
}

impl PendulumEnvConfig {
    /// Sets the number of agents.
    pub fn num_agents(mut self, v: usize) -> Self {
        self.num_agents = v;
        self
    }

    /// Sets the episode length.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }
}

/// Batch of pendulums.
///
/// Each episode starts with `θ` uniform in `[-π, π]` and `θ̇` uniform in `[-1, 1]`.
/// The reward of a step is computed on the state before the torque is applied.
pub struct PendulumEnv {
    config: PendulumEnvConfig,
    rng: SmallRng,
    theta: Vec<f32>,
    thdot: Vec<f32>,
    steps: usize,
    observation_space: BoxSpace,
    action_space: BoxSpace,
}

impl PendulumEnv {
    /// Current observations, `[num_agents, 3]`.
    pub fn observations(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.config.num_agents, 3), |(i, j)| match j {
            0 => self.theta[i].cos(),
            1 => self.theta[i].sin(),
            _ => self.thdot[i],
        })
    }

    /// Places every pendulum in the given state.
    pub fn set_state(&mut self, theta: f32, thdot: f32) {
        self.theta.iter_mut().for_each(|t| *t = theta);
        self.thdot.iter_mut().for_each(|t| *t = thdot);
    }
}

impl Env for PendulumEnv {
    type Config = PendulumEnvConfig;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        ensure!(config.num_agents > 0, "num_agents must be positive");
        let n = config.num_agents;
        Ok(Self {
            config: config.clone(),
            rng: SmallRng::seed_from_u64(seed as u64),
            theta: vec![0.0; n],
            thdot: vec![0.0; n],
            steps: 0,
            observation_space: BoxSpace::new(
                vec![-1.0, -1.0, -MAX_SPEED],
                vec![1.0, 1.0, MAX_SPEED],
            )?,
            action_space: BoxSpace::uniform(1, -MAX_TORQUE, MAX_TORQUE)?,
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
        for i in 0..self.config.num_agents {
            self.theta[i] = self.rng.gen_range(-PI..PI);
            self.thdot[i] = self.rng.gen_range(-1.0..1.0);
        }
        self.steps = 0;
        Ok(self.observations())
    }

    fn step(&mut self, a: &Array2<f32>) -> Result<(Step, Record)> {
        let n = self.config.num_agents;
        ensure!(
            a.dim() == (n, 1),
            "expected actions of shape ({}, 1), got {:?}",
            n,
            a.dim()
        );
        let mut act = a.clone();
        self.action_space.clip(&mut act);

        let mut reward = Vec::with_capacity(n);
        for i in 0..n {
            let (th, thdot, u) = (self.theta[i], self.thdot[i], act[[i, 0]]);
            let th_ = angle_normalize(th);
            reward.push(-(th_ * th_ + 0.1 * thdot * thdot + 0.001 * u * u));
            let (th, thdot) = integrate(th, thdot, u, self.config.g);
            self.theta[i] = th;
            self.thdot[i] = thdot;
        }
        self.steps += 1;
        trace!("Pendulum step {}", self.steps);

        let truncated = (self.steps >= self.config.max_steps) as i8;
        let theta: Array1<f32> = self.theta.iter().map(|&t| angle_normalize(t)).collect();
        let mut record = Record::empty();
        record.insert("theta", RecordValue::from(&theta));
        let step = Step::new(self.observations(), act, reward, vec![0; n], vec![truncated; n]);
        Ok((step, record))
    }
}
