//! Environment step.
use ndarray::Array2;

/// Represents an action, observation and reward tuple `(a_t, o_t+1, r_t)` of a batch of agents.
///
/// An environment emits a [`Step`] object at every interaction step.
#[derive(Clone, Debug)]
pub struct Step {
    /// Action, `[num_agents, action_dim]`.
    pub act: Array2<f32>,

    /// Observation, `[num_agents, state_dim]`.
    pub obs: Array2<f32>,

    /// Reward of each agent.
    pub reward: Vec<f32>,

    /// Flag denoting if the episode of each agent is terminated.
    pub is_terminated: Vec<i8>,

    /// Flag denoting if the episode of each agent is truncated.
    pub is_truncated: Vec<i8>,
}

impl Step {
    /// Constructs a [`Step`] object.
    pub fn new(
        obs: Array2<f32>,
        act: Array2<f32>,
        reward: Vec<f32>,
        is_terminated: Vec<i8>,
        is_truncated: Vec<i8>,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
            is_truncated,
        }
    }

    #[inline]
    /// Terminated or truncated for any agent.
    pub fn is_done(&self) -> bool {
        self.is_terminated.iter().any(|&v| v == 1) || self.is_truncated.iter().any(|&v| v == 1)
    }
}
