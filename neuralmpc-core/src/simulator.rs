//! Batched simulation of candidate action sequences.
use crate::{
    compute::ComputeContext,
    dynamics::DynamicsHandle,
    error::MpcError,
    reward::RewardHandle,
};
use log::trace;
use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// How next states are obtained from the dynamics model.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum RolloutMode {
    /// Use the predicted next state as is.
    Expectation,

    /// Sample next states from the predicted mean and variance.
    ///
    /// Requires [`Dynamics::predict_with_uncertainty`](crate::Dynamics::predict_with_uncertainty).
    Sampled,
}

impl Default for RolloutMode {
    fn default() -> Self {
        Self::Expectation
    }
}

/// Result of [`TrajectorySimulator::simulate`].
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    /// Accumulated cost of each candidate. Diverged candidates cost [`f32::INFINITY`].
    pub costs: Array1<f32>,

    /// The number of diverged candidates.
    pub n_diverged: usize,
}

/// Unrolls candidate action sequences with a dynamics model.
///
/// All candidates are advanced together, one call of the dynamics model and the reward
/// function per horizon step. Neither the model nor the reward is mutated.
#[derive(Clone)]
pub struct TrajectorySimulator {
    dynamics: DynamicsHandle,
    reward: RewardHandle,
    mode: RolloutMode,
}

impl TrajectorySimulator {
    /// Constructs a simulator.
    pub fn new(dynamics: DynamicsHandle, reward: RewardHandle, mode: RolloutMode) -> Self {
        Self {
            dynamics,
            reward,
            mode,
        }
    }

    /// The dynamics model.
    pub fn dynamics(&self) -> &DynamicsHandle {
        &self.dynamics
    }

    /// The rollout mode.
    pub fn mode(&self) -> RolloutMode {
        self.mode
    }

    fn next_states(
        &self,
        ctx: &mut ComputeContext,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        match self.mode {
            RolloutMode::Expectation => self.dynamics.predict(states, actions),
            RolloutMode::Sampled => {
                let (mean, var) = self.dynamics.predict_with_uncertainty(states, actions)?;
                let eps: Array2<f32> = ctx.standard_normal(mean.raw_dim());
                Ok(mean + var.mapv(|v| v.max(0.0).sqrt()) * eps)
            }
        }
    }

    /// Accumulates the predicted cost of each candidate sequence.
    ///
    /// * `start` - `[n_start, state_dim]`, candidate `i` starts from row
    ///   `i / (batch / n_start)`.
    /// * `candidates` - `[batch, horizon, action_dim]`, `batch` a multiple of `n_start`.
    ///
    /// Candidates producing non-finite states or rewards are marked as diverged and cost
    /// [`f32::INFINITY`]. Fails with [`MpcError::DivergedRolloutError`] if all of them
    /// diverge.
    pub fn simulate(
        &self,
        ctx: &mut ComputeContext,
        start: ArrayView2<f32>,
        candidates: ArrayView3<f32>,
    ) -> Result<SimulationOutput, MpcError> {
        let (batch, horizon, action_dim) = candidates.dim();
        let n_start = start.nrows();
        if start.ncols() != self.dynamics.state_dim() {
            return Err(MpcError::ConfigurationError(format!(
                "expected start states of dimension {}, got {}",
                self.dynamics.state_dim(),
                start.ncols()
            )));
        }
        if action_dim != self.dynamics.action_dim() {
            return Err(MpcError::ConfigurationError(format!(
                "expected actions of dimension {}, got {}",
                self.dynamics.action_dim(),
                action_dim
            )));
        }
        if n_start == 0 || batch == 0 || batch % n_start != 0 {
            return Err(MpcError::ConfigurationError(format!(
                "{} candidates cannot be split over {} start states",
                batch, n_start
            )));
        }

        let per_start = batch / n_start;
        let mut states = Array2::from_shape_fn((batch, start.ncols()), |(i, j)| {
            start[[i / per_start, j]]
        });
        let mut costs = Array1::<f32>::zeros(batch);
        let mut diverged = vec![false; batch];

        for h in 0..horizon {
            let actions = candidates.index_axis(Axis(1), h);
            let mut next = self.next_states(ctx, states.view(), actions)?;
            if next.dim() != states.dim() {
                return Err(MpcError::ConfigurationError(format!(
                    "dynamics returned next states of shape {:?} for states of shape {:?}",
                    next.dim(),
                    states.dim()
                )));
            }
            let rewards = self.reward.reward(next.view(), actions);
            if rewards.len() != batch {
                return Err(MpcError::ConfigurationError(format!(
                    "reward function returned {} rewards for {} transitions",
                    rewards.len(),
                    batch
                )));
            }

            for (i, mut row) in next.axis_iter_mut(Axis(0)).enumerate() {
                if diverged[i] {
                    row.fill(0.0);
                    continue;
                }
                if !rewards[i].is_finite() || row.iter().any(|v| !v.is_finite()) {
                    diverged[i] = true;
                    row.fill(0.0);
                    continue;
                }
                costs[i] -= rewards[i];
            }
            states = next;
        }

        for (c, &d) in costs.iter_mut().zip(diverged.iter()) {
            if d || !c.is_finite() {
                *c = f32::INFINITY;
            }
        }
        let n_diverged = costs.iter().filter(|c| !c.is_finite()).count();
        trace!("Simulated {} candidates, {} diverged", batch, n_diverged);

        if n_diverged == batch {
            return Err(MpcError::DivergedRolloutError(format!(
                "all {} candidate trajectories produced non-finite predictions",
                batch
            )));
        }

        Ok(SimulationOutput { costs, n_diverged })
    }

    /// Predicts next states and rewards of a single step, always with the expected model.
    pub fn one_step(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, Array1<f32>), MpcError> {
        let next = self.dynamics.predict(states, actions)?;
        let rewards = self.reward.reward(next.view(), actions);
        if next.iter().chain(rewards.iter()).any(|v| !v.is_finite()) {
            return Err(MpcError::DivergedRolloutError(
                "one-step prediction is not finite".to_string(),
            ));
        }
        Ok((next, rewards))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dummy::{
            DivergingDynamics, IdentityDynamics, IntegratorDynamics, QuadraticReward,
            ShiftDynamics, ZeroReward,
        },
        Dynamics, EnsembleDynamics, RewardFunction,
    };
    use ndarray::{array, s, Array3};
    use std::sync::Arc;

    fn integrator_sim() -> TrajectorySimulator {
        TrajectorySimulator::new(
            Arc::new(IntegratorDynamics::new(1, 1, 1.0)),
            Arc::new(QuadraticReward::new(array![0.0], 0.0)),
            RolloutMode::Expectation,
        )
    }

    #[test]
    fn test_costs_accumulate_over_horizon() {
        let sim = integrator_sim();
        let mut ctx = ComputeContext::new(0);
        let start = array![[1.0f32]];
        // Candidate 0 stays at 1.0, candidate 1 moves to 0.0 and stays.
        let mut candidates = Array3::<f32>::zeros((2, 3, 1));
        candidates[[1, 0, 0]] = -1.0;

        let out = sim.simulate(&mut ctx, start.view(), candidates.view()).unwrap();
        assert_eq!(out.n_diverged, 0);
        assert_eq!(out.costs, array![3.0f32, 0.0]);
    }

    #[test]
    fn test_candidates_grouped_by_start_state() {
        let sim = integrator_sim();
        let mut ctx = ComputeContext::new(0);
        let start = array![[1.0f32], [2.0]];
        let candidates = Array3::<f32>::zeros((4, 1, 1));

        let out = sim.simulate(&mut ctx, start.view(), candidates.view()).unwrap();
        assert_eq!(out.costs, array![1.0f32, 1.0, 4.0, 4.0]);
    }

    #[test]
    fn test_partial_divergence_is_penalised() {
        let sim = TrajectorySimulator::new(
            Arc::new(DivergingDynamics::new(2, 1, 0.5)),
            Arc::new(ZeroReward),
            RolloutMode::Expectation,
        );
        let mut ctx = ComputeContext::new(0);
        let start = array![[0.0f32, 0.0]];
        let mut candidates = Array3::<f32>::zeros((3, 2, 1));
        candidates[[1, 1, 0]] = 1.0;

        let out = sim.simulate(&mut ctx, start.view(), candidates.view()).unwrap();
        assert_eq!(out.n_diverged, 1);
        assert_eq!(out.costs[0], 0.0);
        assert_eq!(out.costs[1], f32::INFINITY);
        assert_eq!(out.costs[2], 0.0);
    }

    #[test]
    fn test_total_divergence_fails() {
        let sim = TrajectorySimulator::new(
            Arc::new(DivergingDynamics::always(2, 1)),
            Arc::new(ZeroReward),
            RolloutMode::Expectation,
        );
        let mut ctx = ComputeContext::new(0);
        let start = array![[0.0f32, 0.0]];
        let candidates = Array3::<f32>::zeros((5, 4, 1));

        let result = sim.simulate(&mut ctx, start.view(), candidates.view());
        assert!(matches!(result, Err(MpcError::DivergedRolloutError(_))));
    }

    #[test]
    fn test_shape_mismatch() {
        let sim = integrator_sim();
        let mut ctx = ComputeContext::new(0);
        let start = array![[0.0f32], [0.0]];
        let candidates = Array3::<f32>::zeros((3, 2, 1));
        let result = sim.simulate(&mut ctx, start.view(), candidates.view());
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));
    }

    #[test]
    fn test_sampled_mode_requires_uncertainty() {
        let sim = TrajectorySimulator::new(
            Arc::new(IdentityDynamics::new(1, 1)),
            Arc::new(ZeroReward),
            RolloutMode::Sampled,
        );
        let mut ctx = ComputeContext::new(0);
        let result = sim.simulate(
            &mut ctx,
            array![[0.0f32]].view(),
            Array3::<f32>::zeros((1, 1, 1)).view(),
        );
        assert!(matches!(result, Err(MpcError::CapabilityNotProvided(_))));
    }

    fn ensemble_sim(mode: RolloutMode) -> TrajectorySimulator {
        let ensemble = EnsembleDynamics::new(vec![
            Arc::new(ShiftDynamics::new(1, 1, 0.0)),
            Arc::new(ShiftDynamics::new(1, 1, 1.0)),
        ])
        .unwrap();
        TrajectorySimulator::new(
            Arc::new(ensemble),
            Arc::new(QuadraticReward::new(array![0.0], 0.0)),
            mode,
        )
    }

    #[test]
    fn test_sampled_rollouts_of_ensemble() {
        let start = array![[0.0f32]];
        let candidates = Array3::<f32>::zeros((8, 3, 1));

        // Members disagree by 1.0, so the expected state moves by 0.5 per step.
        let mut ctx = ComputeContext::new(4);
        let expected = ensemble_sim(RolloutMode::Expectation)
            .simulate(&mut ctx, start.view(), candidates.view())
            .unwrap();
        assert!(expected.costs.iter().all(|&c| (c - 3.5).abs() < 1e-5));

        let sim = ensemble_sim(RolloutMode::Sampled);
        let mut ctx = ComputeContext::new(4);
        let sampled = sim.simulate(&mut ctx, start.view(), candidates.view()).unwrap();
        assert_eq!(sampled.n_diverged, 0);
        assert!(sampled.costs.iter().all(|c| c.is_finite()));
        assert_ne!(sampled.costs, expected.costs);
        assert!(sampled.costs.iter().any(|&c| c != sampled.costs[0]));

        ctx.reseed();
        let again = sim.simulate(&mut ctx, start.view(), candidates.view()).unwrap();
        assert_eq!(again.costs, sampled.costs);
    }

    struct DroppingDynamics;

    impl Dynamics for DroppingDynamics {
        fn state_dim(&self) -> usize {
            1
        }

        fn action_dim(&self) -> usize {
            1
        }

        fn predict(
            &self,
            states: ArrayView2<f32>,
            _actions: ArrayView2<f32>,
        ) -> Result<Array2<f32>, MpcError> {
            Ok(states.slice(s![1.., ..]).to_owned())
        }
    }

    struct ShortReward;

    impl RewardFunction for ShortReward {
        fn state_reward(&self, _states: ArrayView2<f32>) -> Array1<f32> {
            Array1::zeros(1)
        }

        fn actions_reward(&self, _actions: ArrayView2<f32>) -> Array1<f32> {
            Array1::zeros(1)
        }
    }

    #[test]
    fn test_collaborators_breaking_shapes() {
        let mut ctx = ComputeContext::new(0);
        let start = array![[0.0f32]];
        let candidates = Array3::<f32>::zeros((3, 2, 1));

        let sim = TrajectorySimulator::new(
            Arc::new(DroppingDynamics),
            Arc::new(ZeroReward),
            RolloutMode::Expectation,
        );
        let result = sim.simulate(&mut ctx, start.view(), candidates.view());
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));

        let sim = TrajectorySimulator::new(
            Arc::new(IdentityDynamics::new(1, 1)),
            Arc::new(ShortReward),
            RolloutMode::Expectation,
        );
        let result = sim.simulate(&mut ctx, start.view(), candidates.view());
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));
    }
}
