//! Selection of the optimization strategy.
use super::{Cem, CemConfig, Optimizer, Pi2, Pi2Config, RandomShooting, RandomShootingConfig};
use crate::error::MpcError;
use serde::{Deserialize, Serialize};

/// Configuration of an optimizer, one variant per strategy.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum OptimizerConfig {
    /// [`RandomShooting`].
    RandomShooting(RandomShootingConfig),

    /// [`Cem`].
    Cem(CemConfig),

    /// [`Pi2`].
    Pi2(Pi2Config),
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Cem(CemConfig::default())
    }
}

impl OptimizerConfig {
    /// Default configuration of the strategy with the given name.
    ///
    /// Accepts `"RandomShooting"` (or `"RS"`), `"CEM"` and `"PI2"`, ignoring case and
    /// underscores.
    pub fn from_name(name: &str) -> Result<Self, MpcError> {
        match name.replace('_', "").to_lowercase().as_str() {
            "randomshooting" | "rs" => Ok(Self::RandomShooting(RandomShootingConfig::default())),
            "cem" => Ok(Self::Cem(CemConfig::default())),
            "pi2" => Ok(Self::Pi2(Pi2Config::default())),
            _ => Err(MpcError::ConfigurationError(format!(
                "unknown optimizer: {}",
                name
            ))),
        }
    }

    /// Sets the population size of any strategy.
    ///
    /// The number of CEM elites is set to a tenth of the population.
    pub fn population_size(self, v: usize) -> Self {
        match self {
            Self::RandomShooting(c) => Self::RandomShooting(c.population_size(v)),
            Self::Cem(c) => Self::Cem(c.population_size(v).num_elites((v / 10).max(1))),
            Self::Pi2(c) => Self::Pi2(c.population_size(v)),
        }
    }

    /// Builds the optimizer.
    pub fn build(&self) -> Result<Box<dyn Optimizer>, MpcError> {
        Ok(match self {
            Self::RandomShooting(c) => Box::new(RandomShooting::build(c.clone())?),
            Self::Cem(c) => Box::new(Cem::build(c.clone())?),
            Self::Pi2(c) => Box::new(Pi2::build(c.clone())?),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(
            OptimizerConfig::from_name("PI2").unwrap(),
            OptimizerConfig::Pi2(Pi2Config::default())
        );
        assert_eq!(
            OptimizerConfig::from_name("random_shooting").unwrap(),
            OptimizerConfig::RandomShooting(RandomShootingConfig::default())
        );
        assert_eq!(OptimizerConfig::from_name("cem").unwrap().build().unwrap().name(), "CEM");
        assert!(matches!(
            OptimizerConfig::from_name("ilqr"),
            Err(MpcError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_population_size_applies_to_any_strategy() {
        for name in ["RS", "CEM", "PI2"] {
            let opt = OptimizerConfig::from_name(name)
                .unwrap()
                .population_size(200)
                .build()
                .unwrap();
            assert_eq!(opt.population_size(), 200);
        }
    }

    #[test]
    fn test_serde() {
        let config = OptimizerConfig::Cem(CemConfig::default().iterations(8));
        let yaml = serde_yaml::to_string(&config).unwrap();
        let config_: OptimizerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, config_);
    }
}
