use ndarray::{Array1, ArrayView2, Axis};
use neuralmpc_core::RewardFunction;

/// `-(θ² + 0.1 θ̇²)` of observations `[cos θ, sin θ, θ̇]`, with `θ` in `[-π, π]`.
pub fn pendulum_state_reward(states: ArrayView2<f32>) -> Array1<f32> {
    states.map_axis(Axis(1), |s| {
        let theta = s[1].atan2(s[0]);
        -(theta * theta + 0.1 * s[2] * s[2])
    })
}

/// `-0.001 u²`.
pub fn pendulum_actions_reward(actions: ArrayView2<f32>) -> Array1<f32> {
    actions.map_axis(Axis(1), |a| -0.001 * a.dot(&a))
}

/// Reward of the pendulum swing-up.
#[derive(Default, Clone, Copy)]
pub struct PendulumReward;

impl RewardFunction for PendulumReward {
    fn state_reward(&self, states: ArrayView2<f32>) -> Array1<f32> {
        pendulum_state_reward(states)
    }

    fn actions_reward(&self, actions: ArrayView2<f32>) -> Array1<f32> {
        pendulum_actions_reward(actions)
    }
}
