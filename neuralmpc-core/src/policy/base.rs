use crate::{dynamics::DynamicsHandle, error::MpcError};
use ndarray::{Array1, Array2, Array3, ArrayView2};

/// Result of [`ModelBasedPolicy::act`].
#[derive(Clone, Debug)]
pub struct ActOutput {
    /// Action of each agent, `[num_agents, action_dim]`, inside the action space.
    pub action: Array2<f32>,

    /// First action of the plan, before exploration noise.
    pub intended_action: Array2<f32>,

    /// Observation predicted by the dynamics model after the intended action.
    pub predicted_observation: Array2<f32>,

    /// Reward predicted for the intended transition.
    pub predicted_reward: Array1<f32>,

    /// Predicted cost of the plan of each agent.
    pub planned_cost: Array1<f32>,

    /// The plan, `[num_agents, horizon, action_dim]`.
    pub plan: Array3<f32>,
}

/// Interface of controllers driven by a dynamics model.
///
/// A policy is used in episodes: [`ModelBasedPolicy::reset`] is called at the start
/// of each episode, then [`ModelBasedPolicy::act`] once per time step. Calls on one
/// policy must not overlap.
///
/// The provided methods fail with [`MpcError::CapabilityNotProvided`]; concrete
/// policies override both.
pub trait ModelBasedPolicy {
    /// The dynamics model the policy plans with.
    fn system_dynamics(&self) -> &DynamicsHandle;

    /// Selects the actions of a batch of agents at time step `t`.
    ///
    /// * `observations` - `[num_agents, state_dim]`.
    /// * `exploration_noise` - perturbs the selected action with bounded noise, then
    ///   clips it into the action space. Predictions and the logged intended action
    ///   are computed without the noise.
    /// * `log_results` - writes diagnostics to the recorder of the policy.
    fn act(
        &mut self,
        _observations: ArrayView2<f32>,
        _t: usize,
        _exploration_noise: bool,
        _log_results: bool,
    ) -> Result<ActOutput, MpcError> {
        Err(MpcError::CapabilityNotProvided(
            "act() is not provided by this policy".to_string(),
        ))
    }

    /// Clears the state of the policy before a new episode.
    fn reset(&mut self) -> Result<(), MpcError> {
        Err(MpcError::CapabilityNotProvided(
            "reset() is not provided by this policy".to_string(),
        ))
    }
}

/// Holds the dynamics model shared by model-based policies.
///
/// It implements none of the control capabilities.
#[derive(Clone)]
pub struct BasePolicy {
    system_dynamics: DynamicsHandle,
}

impl BasePolicy {
    /// Keeps a reference to the dynamics model, without any computation.
    pub fn new(system_dynamics: Option<DynamicsHandle>) -> Result<Self, MpcError> {
        match system_dynamics {
            Some(system_dynamics) => Ok(Self { system_dynamics }),
            None => Err(MpcError::ConfigurationError(
                "a dynamics model is required".to_string(),
            )),
        }
    }
}

impl ModelBasedPolicy for BasePolicy {
    fn system_dynamics(&self) -> &DynamicsHandle {
        &self.system_dynamics
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dummy::IdentityDynamics;
    use ndarray::array;
    use std::sync::Arc;

    #[test]
    fn test_base_policy_provides_no_capability() {
        let mut policy = BasePolicy::new(Some(Arc::new(IdentityDynamics::new(2, 1)))).unwrap();
        assert_eq!(policy.system_dynamics().state_dim(), 2);

        let obs = array![[0.0f32, 0.0]];
        assert!(matches!(
            policy.act(obs.view(), 0, false, true),
            Err(MpcError::CapabilityNotProvided(_))
        ));
        assert!(matches!(policy.reset(), Err(MpcError::CapabilityNotProvided(_))));
    }

    #[test]
    fn test_missing_dynamics() {
        assert!(matches!(
            BasePolicy::new(None),
            Err(MpcError::ConfigurationError(_))
        ));
    }
}
