//! Environments with their exact dynamics and reward functions.
pub mod pendulum;
pub use pendulum::{PendulumDynamics, PendulumEnv, PendulumEnvConfig, PendulumReward};
