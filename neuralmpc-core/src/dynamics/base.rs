use crate::error::MpcError;
use ndarray::{Array2, ArrayView2};
use std::sync::Arc;

/// A model predicting next states of a batch of transitions.
///
/// The model is shared read-only by every candidate of a batch and by every policy
/// holding a [`DynamicsHandle`], so prediction takes `&self`.
pub trait Dynamics: Send + Sync {
    /// Dimension of a state.
    fn state_dim(&self) -> usize;

    /// Dimension of an action.
    fn action_dim(&self) -> usize;

    /// Predicts next states, `[batch, state_dim]` and `[batch, action_dim]` to
    /// `[batch, state_dim]`.
    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError>;

    /// Predicts the mean and the variance of next states.
    fn predict_with_uncertainty(
        &self,
        _states: ArrayView2<f32>,
        _actions: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>), MpcError> {
        Err(MpcError::CapabilityNotProvided(
            "predict_with_uncertainty".to_string(),
        ))
    }
}

/// Shared reference to a trained dynamics model.
pub type DynamicsHandle = Arc<dyn Dynamics>;

/// Checks shapes of the inputs of [`Dynamics::predict`].
pub fn check_batch(
    dynamics: &dyn Dynamics,
    states: &ArrayView2<f32>,
    actions: &ArrayView2<f32>,
) -> Result<(), MpcError> {
    if states.ncols() != dynamics.state_dim() {
        return Err(MpcError::ConfigurationError(format!(
            "expected states of dimension {}, got {}",
            dynamics.state_dim(),
            states.ncols()
        )));
    }
    if actions.ncols() != dynamics.action_dim() {
        return Err(MpcError::ConfigurationError(format!(
            "expected actions of dimension {}, got {}",
            dynamics.action_dim(),
            actions.ncols()
        )));
    }
    if states.nrows() != actions.nrows() {
        return Err(MpcError::ConfigurationError(format!(
            "batch sizes of states and actions differ: {} vs {}",
            states.nrows(),
            actions.nrows()
        )));
    }
    Ok(())
}
