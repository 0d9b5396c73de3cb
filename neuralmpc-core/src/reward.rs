//! Reward functions evaluated on predicted transitions.
use ndarray::{Array1, ArrayView2};
use std::sync::Arc;

/// Pure, vectorised reward of states and actions.
///
/// The cost minimised by the optimizers is the negative of the accumulated reward.
pub trait RewardFunction: Send + Sync {
    /// Reward of each state in `[batch, state_dim]`.
    fn state_reward(&self, states: ArrayView2<f32>) -> Array1<f32>;

    /// Reward of each action in `[batch, action_dim]`.
    fn actions_reward(&self, actions: ArrayView2<f32>) -> Array1<f32>;

    /// Reward of reaching `next_states` by taking `actions`.
    fn reward(&self, next_states: ArrayView2<f32>, actions: ArrayView2<f32>) -> Array1<f32> {
        self.state_reward(next_states) + self.actions_reward(actions)
    }
}

/// Shared reference to a reward function.
pub type RewardHandle = Arc<dyn RewardFunction>;

/// A [`RewardFunction`] made of a pair of closures.
///
/// ```rust
/// use neuralmpc_core::{FnReward, RewardFunction};
/// use ndarray::{array, Axis};
///
/// let reward = FnReward::new(
///     |s| s.map_axis(Axis(1), |row| -row.dot(&row)),
///     |a| a.map_axis(Axis(1), |row| -0.01 * row.dot(&row)),
/// );
/// let r = reward.reward(array![[1.0f32, 0.0]].view(), array![[2.0f32]].view());
/// assert!((r[0] + 1.04).abs() < 1e-6);
/// ```
pub struct FnReward<S, A> {
    state_fn: S,
    actions_fn: A,
}

impl<S, A> FnReward<S, A>
where
    S: Fn(ArrayView2<f32>) -> Array1<f32> + Send + Sync,
    A: Fn(ArrayView2<f32>) -> Array1<f32> + Send + Sync,
{
    /// Builds the reward from a state reward and an action reward.
    pub fn new(state_fn: S, actions_fn: A) -> Self {
        Self {
            state_fn,
            actions_fn,
        }
    }
}

impl<S, A> RewardFunction for FnReward<S, A>
where
    S: Fn(ArrayView2<f32>) -> Array1<f32> + Send + Sync,
    A: Fn(ArrayView2<f32>) -> Array1<f32> + Send + Sync,
{
    fn state_reward(&self, states: ArrayView2<f32>) -> Array1<f32> {
        (self.state_fn)(states)
    }

    fn actions_reward(&self, actions: ArrayView2<f32>) -> Array1<f32> {
        (self.actions_fn)(actions)
    }
}
