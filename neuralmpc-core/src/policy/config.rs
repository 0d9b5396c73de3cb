//! Configuration of [`MpcPolicy`](super::MpcPolicy).
use super::ExplorationNoiseConfig;
use crate::{error::MpcError, optimizer::OptimizerConfig, record::AsyncRecorderConfig, RolloutMode};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`MpcPolicy`](super::MpcPolicy).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MpcPolicyConfig {
    /// The number of agents controlled in a batch.
    pub num_agents: usize,

    /// The number of time steps of a plan.
    pub planning_horizon: usize,

    /// Optimization strategy.
    pub optimizer: OptimizerConfig,

    /// Noise added when exploration is requested.
    pub exploration: ExplorationNoiseConfig,

    /// How the simulator uses the dynamics model.
    pub rollout_mode: RolloutMode,

    /// The number of time steps of an episode, if bounded.
    ///
    /// `act()` rejects time steps beyond it until the policy is reset.
    pub episode_length: Option<usize>,

    /// Seed of the random streams of the policy.
    pub seed: u64,

    /// Queue of the logging sink.
    pub logging: AsyncRecorderConfig,
}

impl Default for MpcPolicyConfig {
    fn default() -> Self {
        Self {
            num_agents: 1,
            planning_horizon: 20,
            optimizer: OptimizerConfig::default(),
            exploration: ExplorationNoiseConfig::default(),
            rollout_mode: RolloutMode::default(),
            episode_length: None,
            seed: 42,
            logging: AsyncRecorderConfig::default(),
        }
    }
}

impl MpcPolicyConfig {
    /// Sets the number of agents.
    pub fn num_agents(mut self, v: usize) -> Self {
        self.num_agents = v;
        self
    }

    /// Sets the planning horizon.
    pub fn planning_horizon(mut self, v: usize) -> Self {
        self.planning_horizon = v;
        self
    }

    /// Sets the optimizer.
    pub fn optimizer(mut self, v: OptimizerConfig) -> Self {
        self.optimizer = v;
        self
    }

    /// Sets the exploration noise.
    pub fn exploration(mut self, v: ExplorationNoiseConfig) -> Self {
        self.exploration = v;
        self
    }

    /// Sets the rollout mode.
    pub fn rollout_mode(mut self, v: RolloutMode) -> Self {
        self.rollout_mode = v;
        self
    }

    /// Sets the episode length.
    pub fn episode_length(mut self, v: usize) -> Self {
        self.episode_length = Some(v);
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the configuration of the logging queue.
    pub fn logging(mut self, v: AsyncRecorderConfig) -> Self {
        self.logging = v;
        self
    }

    /// Checks sizes and the exploration noise.
    pub fn validate(&self) -> Result<(), MpcError> {
        if self.num_agents == 0 {
            return Err(MpcError::ConfigurationError(
                "num_agents must be positive".to_string(),
            ));
        }
        if self.planning_horizon == 0 {
            return Err(MpcError::ConfigurationError(
                "planning_horizon must be positive".to_string(),
            ));
        }
        self.exploration.validate()
    }

    /// Constructs [`MpcPolicyConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MpcPolicyConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::optimizer::Pi2Config;
    use tempdir::TempDir;

    #[test]
    fn test_serde_mpc_policy_config() -> Result<()> {
        let config = MpcPolicyConfig::default()
            .num_agents(4)
            .planning_horizon(30)
            .optimizer(OptimizerConfig::Pi2(Pi2Config::default().temperature(0.5)))
            .exploration(ExplorationNoiseConfig::OrnsteinUhlenbeck {
                theta: 0.15,
                sigma: 0.2,
                dt: 0.05,
                bound: 0.5,
            })
            .episode_length(200)
            .seed(7);

        let dir = TempDir::new("mpc_policy_config")?;
        let path = dir.path().join("mpc_policy_config.yaml");
        config.save(&path)?;
        let config_ = MpcPolicyConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(MpcPolicyConfig::default().validate().is_ok());
        assert!(MpcPolicyConfig::default().planning_horizon(0).validate().is_err());
        assert!(MpcPolicyConfig::default().num_agents(0).validate().is_err());
    }
}
