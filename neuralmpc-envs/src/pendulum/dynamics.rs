use super::{integrate, GRAVITY};
use ndarray::{Array2, ArrayView2, Axis};
use neuralmpc_core::{dynamics::check_batch, error::MpcError, Dynamics};

/// Exact pendulum model on observations `[cos θ, sin θ, θ̇]`.
pub struct PendulumDynamics {
    g: f32,
}

impl Default for PendulumDynamics {
    fn default() -> Self {
        Self { g: GRAVITY }
    }
}

impl PendulumDynamics {
    /// Model with the given gravity.
    pub fn new(g: f32) -> Self {
        Self { g }
    }
}

impl Dynamics for PendulumDynamics {
    fn state_dim(&self) -> usize {
        3
    }

    fn action_dim(&self) -> usize {
        1
    }

    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        check_batch(self, &states, &actions)?;
        let mut next = Array2::zeros(states.raw_dim());
        for ((s, a), mut n) in states
            .axis_iter(Axis(0))
            .zip(actions.axis_iter(Axis(0)))
            .zip(next.axis_iter_mut(Axis(0)))
        {
            let theta = s[1].atan2(s[0]);
            let (theta, thdot) = integrate(theta, s[2], a[0], self.g);
            n[0] = theta.cos();
            n[1] = theta.sin();
            n[2] = thdot;
        }
        Ok(next)
    }
}
