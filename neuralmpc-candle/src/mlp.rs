//! Multilayer perceptron.
use anyhow::Result;
use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use serde::{Deserialize, Serialize};

/// Activation function of hidden layers.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum Activation {
    /// Rectified linear unit.
    ReLU,

    /// Hyperbolic tangent.
    Tanh,

    /// Identity.
    None,
}

impl Activation {
    /// Applies the activation.
    pub fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::ReLU => xs.relu(),
            Self::Tanh => xs.tanh(),
            Self::None => Ok(xs.clone()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Mlp`].
pub struct MlpConfig {
    /// Input dimension.
    pub in_dim: usize,

    /// Units of the hidden layers.
    pub units: Vec<usize>,

    /// Output dimension.
    pub out_dim: usize,

    /// Activation of the hidden layers. The output layer is linear.
    pub activation: Activation,
}

impl MlpConfig {
    /// Creates configuration of MLP.
    pub fn new(in_dim: usize, units: Vec<usize>, out_dim: usize, activation: Activation) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation,
        }
    }
}

/// Multilayer perceptron with a linear output layer.
pub struct Mlp {
    activation: Activation,
    layers: Vec<Linear>,
}

impl Mlp {
    /// Builds the layers with variables under `vs`.
    pub fn build(vs: VarBuilder, config: &MlpConfig) -> Result<Self> {
        let dims = std::iter::once(config.in_dim)
            .chain(config.units.iter().cloned())
            .chain(std::iter::once(config.out_dim))
            .collect::<Vec<_>>();
        let vs = vs.pp("mlp");
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| linear(w[0], w[1], vs.pp(format!("ln{}", i))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            activation: config.activation,
            layers,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let n_layers = self.layers.len();
        let mut xs = xs.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if i + 1 < n_layers {
                xs = self.activation.forward(&xs)?;
            }
        }
        Ok(xs)
    }
}
