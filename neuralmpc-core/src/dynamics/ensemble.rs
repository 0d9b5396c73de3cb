use super::{check_batch, Dynamics, DynamicsHandle};
use crate::error::MpcError;
use ndarray::{Array2, ArrayView2};

/// A set of dynamics models, e.g. networks trained from different initialisations.
///
/// The spread of the member predictions serves as the uncertainty of the ensemble.
pub struct EnsembleDynamics {
    members: Vec<DynamicsHandle>,
}

impl EnsembleDynamics {
    /// Builds an ensemble. Members must agree on the state and action dimensions.
    pub fn new(members: Vec<DynamicsHandle>) -> Result<Self, MpcError> {
        let first = members.first().ok_or_else(|| {
            MpcError::ConfigurationError("an ensemble needs at least one member".to_string())
        })?;
        let (sd, ad) = (first.state_dim(), first.action_dim());
        if members
            .iter()
            .any(|m| m.state_dim() != sd || m.action_dim() != ad)
        {
            return Err(MpcError::ConfigurationError(
                "ensemble members disagree on dimensions".to_string(),
            ));
        }
        Ok(Self { members })
    }

    /// The number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`, an ensemble has at least one member.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Dynamics for EnsembleDynamics {
    fn state_dim(&self) -> usize {
        self.members[0].state_dim()
    }

    fn action_dim(&self) -> usize {
        self.members[0].action_dim()
    }

    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        Ok(self.predict_with_uncertainty(states, actions)?.0)
    }

    fn predict_with_uncertainty(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>), MpcError> {
        check_batch(self, &states, &actions)?;
        let preds = self
            .members
            .iter()
            .map(|m| m.predict(states, actions))
            .collect::<Result<Vec<_>, _>>()?;
        let n = preds.len() as f32;

        let mut mean = Array2::<f32>::zeros(states.raw_dim());
        for p in preds.iter() {
            mean += p;
        }
        mean /= n;

        let mut var = Array2::<f32>::zeros(states.raw_dim());
        for p in preds.iter() {
            let d = p - &mean;
            var += &(&d * &d);
        }
        var /= n;

        Ok((mean, var))
    }
}
