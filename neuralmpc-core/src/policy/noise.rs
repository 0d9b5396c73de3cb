use crate::error::MpcError;
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Exploration noise added to the selected action.
///
/// Values are in action units. The noise is clamped to `[-bound, bound]` before it is
/// added to the action.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum ExplorationNoiseConfig {
    /// Independent Gaussian noise.
    Gaussian {
        /// Standard deviation.
        std: f32,

        /// Largest absolute perturbation.
        bound: f32,
    },

    /// Ornstein-Uhlenbeck process, correlated over time steps.
    ///
    /// `x <- x - theta * x * dt + sigma * sqrt(dt) * N(0, 1)`
    OrnsteinUhlenbeck {
        /// Rate of mean reversion.
        theta: f32,

        /// Scale of the diffusion.
        sigma: f32,

        /// Time step.
        dt: f32,

        /// Largest absolute perturbation.
        bound: f32,
    },
}

impl Default for ExplorationNoiseConfig {
    fn default() -> Self {
        Self::Gaussian {
            std: 0.1,
            bound: 0.3,
        }
    }
}

impl ExplorationNoiseConfig {
    /// Largest absolute perturbation.
    pub fn bound(&self) -> f32 {
        match self {
            Self::Gaussian { bound, .. } => *bound,
            Self::OrnsteinUhlenbeck { bound, .. } => *bound,
        }
    }

    /// Checks that all parameters are finite and non-negative.
    pub fn validate(&self) -> Result<(), MpcError> {
        let params = match self {
            Self::Gaussian { std, bound } => vec![*std, *bound],
            Self::OrnsteinUhlenbeck {
                theta,
                sigma,
                dt,
                bound,
            } => vec![*theta, *sigma, *dt, *bound],
        };
        if params.iter().all(|p| p.is_finite() && *p >= 0.0) {
            Ok(())
        } else {
            Err(MpcError::ConfigurationError(format!(
                "invalid exploration noise: {:?}",
                self
            )))
        }
    }

    /// Samples the noise of one control step, `[num_agents, action_dim]`.
    ///
    /// `process` is the state of the Ornstein-Uhlenbeck process and is left untouched by
    /// Gaussian noise.
    pub fn sample<R: Rng>(&self, rng: &mut R, process: &mut Array2<f32>) -> Array2<f32> {
        let bound = self.bound();
        let noise = match self {
            Self::Gaussian { std, .. } => {
                Array2::from_shape_simple_fn(process.raw_dim(), || {
                    std * rng.sample::<f32, _>(StandardNormal)
                })
            }
            Self::OrnsteinUhlenbeck {
                theta, sigma, dt, ..
            } => {
                let diffusion = sigma * dt.sqrt();
                process.mapv_inplace(|x| {
                    x - theta * x * dt + diffusion * rng.sample::<f32, _>(StandardNormal)
                });
                process.clone()
            }
        };
        noise.mapv(|x| x.max(-bound).min(bound))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_noise_is_bounded() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut process = Array2::zeros((4, 2));
        let gaussian = ExplorationNoiseConfig::Gaussian { std: 5.0, bound: 0.2 };
        let ou = ExplorationNoiseConfig::OrnsteinUhlenbeck {
            theta: 0.15,
            sigma: 5.0,
            dt: 0.05,
            bound: 0.2,
        };

        for _ in 0..20 {
            for config in [&gaussian, &ou] {
                let noise = config.sample(&mut rng, &mut process);
                assert_eq!(noise.dim(), (4, 2));
                assert!(noise.iter().all(|x| x.abs() <= 0.2));
            }
        }
    }

    #[test]
    fn test_ou_process_is_carried_over() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut process = Array2::zeros((1, 1));
        let ou = ExplorationNoiseConfig::OrnsteinUhlenbeck {
            theta: 0.15,
            sigma: 0.3,
            dt: 0.05,
            bound: 10.0,
        };
        let n1 = ou.sample(&mut rng, &mut process);
        assert_eq!(n1, process);
        let x = process[[0, 0]];
        let n2 = ou.sample(&mut rng, &mut process);
        assert_ne!(n2[[0, 0]], x);
    }

    #[test]
    fn test_validate() {
        let bad = ExplorationNoiseConfig::Gaussian { std: -1.0, bound: 0.2 };
        assert!(bad.validate().is_err());
        assert!(ExplorationNoiseConfig::default().validate().is_ok());
    }
}
