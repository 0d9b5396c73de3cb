//! Dynamics model learned from transitions.
use crate::{
    mlp::{Activation, Mlp, MlpConfig},
    opt::OptConfig,
    util::{array2_to_tensor, tensor_to_array2},
    Device,
};
use anyhow::Result;
use candle_core::{DType, Module, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::{debug, info};
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use neuralmpc_core::{
    error::MpcError,
    record::{Record, RecordValue},
    rollout::TransitionDataset,
    Dynamics,
};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

const PARAMS_FILE: &str = "mlp.safetensors";
const NORMALIZER_FILE: &str = "normalizer.yaml";
const CONFIG_FILE: &str = "config.yaml";

/// Configuration of [`MlpDynamics`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MlpDynamicsConfig {
    /// Units of the hidden layers.
    pub units: Vec<usize>,

    /// Activation of the hidden layers.
    pub activation: Activation,

    /// Optimizer of the parameters.
    pub opt_config: OptConfig,

    /// Device the network runs on.
    pub device: Device,

    /// Minibatch size.
    pub batch_size: usize,

    /// The number of passes over the dataset in [`MlpDynamics::fit`].
    pub epochs: usize,

    /// Seed of minibatch shuffling.
    pub seed: u64,
}

impl Default for MlpDynamicsConfig {
    fn default() -> Self {
        Self {
            units: vec![64, 64],
            activation: Activation::ReLU,
            opt_config: OptConfig::default(),
            device: Device::Cpu,
            batch_size: 128,
            epochs: 30,
            seed: 0,
        }
    }
}

impl MlpDynamicsConfig {
    /// Sets the hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }

    /// Sets the activation of the hidden layers.
    pub fn activation(mut self, v: Activation) -> Self {
        self.activation = v;
        self
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the minibatch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the number of epochs.
    pub fn epochs(mut self, v: usize) -> Self {
        self.epochs = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`MlpDynamicsConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MlpDynamicsConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Mean and standard deviation of each column.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
struct Moments {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl Moments {
    fn identity(dim: usize) -> Self {
        Self {
            mean: Array1::zeros(dim),
            std: Array1::ones(dim),
        }
    }

    fn from_data(x: &Array2<f32>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let std = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-6 { s } else { 1.0 });
        Self { mean, std }
    }

    fn normalize(&self, x: &ArrayView2<f32>) -> Array2<f32> {
        (x - &self.mean) / &self.std
    }

    fn denormalize(&self, x: &Array2<f32>) -> Array2<f32> {
        x * &self.std + &self.mean
    }
}

/// Normalisation of inputs and outputs of the network.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
struct Normalizer {
    state_dim: usize,
    action_dim: usize,
    states: Moments,
    actions: Moments,
    deltas: Moments,
}

impl Normalizer {
    fn identity(state_dim: usize, action_dim: usize) -> Self {
        Self {
            state_dim,
            action_dim,
            states: Moments::identity(state_dim),
            actions: Moments::identity(action_dim),
            deltas: Moments::identity(state_dim),
        }
    }

    fn from_dataset(dataset: &TransitionDataset) -> Self {
        Self {
            state_dim: dataset.states.ncols(),
            action_dim: dataset.actions.ncols(),
            states: Moments::from_data(&dataset.states),
            actions: Moments::from_data(&dataset.actions),
            deltas: Moments::from_data(&(&dataset.next_states - &dataset.states)),
        }
    }

    fn inputs(&self, states: &ArrayView2<f32>, actions: &ArrayView2<f32>) -> Result<Array2<f32>> {
        let s = self.states.normalize(states);
        let a = self.actions.normalize(actions);
        Ok(concatenate(Axis(1), &[s.view(), a.view()])?)
    }
}

/// Deterministic dynamics model with a multilayer perceptron.
///
/// The network takes the normalised state and action and predicts the normalised
/// change of the state, `s' = s + f(s, a)`. Normalisation statistics are computed from
/// the dataset on every [`MlpDynamics::fit`].
pub struct MlpDynamics {
    config: MlpDynamicsConfig,
    device: candle_core::Device,
    varmap: VarMap,
    mlp: Mlp,
    normalizer: Normalizer,
}

impl MlpDynamics {
    /// Builds an untrained model.
    pub fn build(config: MlpDynamicsConfig, state_dim: usize, action_dim: usize) -> Result<Self> {
        Self::build_with_normalizer(config, Normalizer::identity(state_dim, action_dim))
    }

    fn build_with_normalizer(config: MlpDynamicsConfig, normalizer: Normalizer) -> Result<Self> {
        let device: candle_core::Device = config.device.try_into()?;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let mlp_config = MlpConfig::new(
            normalizer.state_dim + normalizer.action_dim,
            config.units.clone(),
            normalizer.state_dim,
            config.activation,
        );
        let mlp = Mlp::build(vs, &mlp_config)?;

        Ok(Self {
            config,
            device,
            varmap,
            mlp,
            normalizer,
        })
    }

    /// Configuration of the model.
    pub fn config(&self) -> &MlpDynamicsConfig {
        &self.config
    }

    /// Fits the model to the transitions of `dataset` by minimising the mean squared
    /// error of the normalised state change.
    ///
    /// Returns a record with the mean loss of the last epoch as `loss` and of every
    /// epoch as `loss_history`.
    pub fn fit(&mut self, dataset: &TransitionDataset) -> Result<Record> {
        if dataset.states.ncols() != self.state_dim()
            || dataset.actions.ncols() != self.action_dim()
        {
            return Err(MpcError::ConfigurationError(format!(
                "dataset of dimensions ({}, {}) for a model of dimensions ({}, {})",
                dataset.states.ncols(),
                dataset.actions.ncols(),
                self.state_dim(),
                self.action_dim()
            ))
            .into());
        }
        if dataset.is_empty() {
            return Err(MpcError::ConfigurationError("empty dataset".to_string()).into());
        }

        self.normalizer = Normalizer::from_dataset(dataset);
        let inputs = self
            .normalizer
            .inputs(&dataset.states.view(), &dataset.actions.view())?;
        let targets = self
            .normalizer
            .deltas
            .normalize(&(&dataset.next_states - &dataset.states).view());
        let inputs = array2_to_tensor(inputs.view(), &self.device)?;
        let targets = array2_to_tensor(targets.view(), &self.device)?;

        let mut opt = self.config.opt_config.build(self.varmap.all_vars())?;
        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        let mut indices = (0..dataset.len() as u32).collect::<Vec<_>>();
        let batch_size = self.config.batch_size.max(1);
        let mut history = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            indices.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut n_batches = 0;
            for chunk in indices.chunks(batch_size) {
                let ix = Tensor::from_slice(chunk, (chunk.len(),), &self.device)?;
                let x = inputs.index_select(&ix, 0)?;
                let y = targets.index_select(&ix, 0)?;
                let loss = candle_nn::loss::mse(&self.mlp.forward(&x)?, &y)?;
                opt.backward_step(&loss)?;
                loss_sum += loss.to_scalar::<f32>()?;
                n_batches += 1;
            }
            let loss = loss_sum / n_batches.max(1) as f32;
            debug!("Epoch {}: loss = {}", epoch, loss);
            history.push(loss);
        }

        let last = history.last().cloned().unwrap_or(f32::NAN);
        info!(
            "Fitted dynamics on {} transitions, final loss {}",
            dataset.len(),
            last
        );
        let mut record = dataset.summary();
        record.insert("loss", RecordValue::Scalar(last));
        record.insert("loss_history", RecordValue::Array1(history));
        Ok(record)
    }

    /// Saves the parameters, the normalisation and the configuration in `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        self.varmap.save(dir.join(PARAMS_FILE))?;
        let mut file = File::create(dir.join(NORMALIZER_FILE))?;
        file.write_all(serde_yaml::to_string(&self.normalizer)?.as_bytes())?;
        self.config.save(dir.join(CONFIG_FILE))?;
        info!("Saved dynamics model to {:?}", dir);
        Ok(())
    }

    /// Loads a model saved with [`MlpDynamics::save`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let config = MlpDynamicsConfig::load(dir.join(CONFIG_FILE))?;
        let rdr = BufReader::new(File::open(dir.join(NORMALIZER_FILE))?);
        let normalizer: Normalizer = serde_yaml::from_reader(rdr)?;
        let mut model = Self::build_with_normalizer(config, normalizer)?;
        model.varmap.load(dir.join(PARAMS_FILE))?;
        info!("Loaded dynamics model from {:?}", dir);
        Ok(model)
    }

    fn forward(&self, states: &ArrayView2<f32>, actions: &ArrayView2<f32>) -> Result<Array2<f32>> {
        let inputs = self.normalizer.inputs(states, actions)?;
        let inputs = array2_to_tensor(inputs.view(), &self.device)?;
        let deltas = tensor_to_array2(&self.mlp.forward(&inputs)?)?;
        Ok(states + &self.normalizer.deltas.denormalize(&deltas))
    }
}

impl Dynamics for MlpDynamics {
    fn state_dim(&self) -> usize {
        self.normalizer.state_dim
    }

    fn action_dim(&self) -> usize {
        self.normalizer.action_dim
    }

    fn predict(
        &self,
        states: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Result<Array2<f32>, MpcError> {
        neuralmpc_core::dynamics::check_batch(self, &states, &actions)?;
        self.forward(&states, &actions)
            .map_err(|e| MpcError::DivergedRolloutError(format!("network failure: {}", e)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array;
    use rand::Rng;
    use tempdir::TempDir;

    /// Transitions of `s' = s + 0.1 * [a, -a]`.
    fn dataset(n: usize) -> TransitionDataset {
        let mut rng = SmallRng::seed_from_u64(42);
        let states = Array::from_shape_simple_fn((n, 2), || rng.gen_range(-1.0f32..1.0));
        let actions = Array::from_shape_simple_fn((n, 1), || rng.gen_range(-1.0f32..1.0));
        let mut next_states = states.clone();
        for i in 0..n {
            next_states[[i, 0]] += 0.1 * actions[[i, 0]];
            next_states[[i, 1]] -= 0.1 * actions[[i, 0]];
        }
        TransitionDataset {
            states,
            actions,
            next_states,
        }
    }

    fn config() -> MlpDynamicsConfig {
        MlpDynamicsConfig::default()
            .units(vec![32, 32])
            .batch_size(64)
            .epochs(40)
            .opt_config(OptConfig::Adam { lr: 3e-3 })
    }

    #[test]
    fn test_fit_reduces_loss() -> Result<()> {
        let data = dataset(512);
        let mut model = MlpDynamics::build(config(), 2, 1)?;
        let record = model.fit(&data)?;
        let history = record.get_array1("loss_history")?;
        assert_eq!(history.len(), 40);
        assert!(history[39] < history[0]);

        let pred = model.predict(data.states.view(), data.actions.view())?;
        let err = (&pred - &data.next_states).mapv(f32::abs).mean().unwrap();
        assert!(err < 0.02, "{}", err);
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let data = dataset(128);
        let mut model = MlpDynamics::build(config().epochs(2), 2, 1)?;
        model.fit(&data)?;

        let dir = TempDir::new("mlp_dynamics")?;
        model.save(dir.path())?;
        let model_ = MlpDynamics::load(dir.path())?;
        assert_eq!(model.config(), model_.config());

        let pred = model.predict(data.states.view(), data.actions.view())?;
        let pred_ = model_.predict(data.states.view(), data.actions.view())?;
        assert!((&pred - &pred_).iter().all(|d| d.abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch() -> Result<()> {
        let model = MlpDynamics::build(config(), 2, 1)?;
        let result = model.predict(Array2::zeros((3, 2)).view(), Array2::zeros((3, 2)).view());
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));
        let empty = TransitionDataset {
            states: Array2::zeros((0, 2)),
            actions: Array2::zeros((0, 1)),
            next_states: Array2::zeros((0, 2)),
        };
        let mut model = model;
        assert!(model.fit(&empty).is_err());
        Ok(())
    }
}
