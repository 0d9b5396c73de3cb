#![warn(missing_docs)]
//! Core of a model predictive control (MPC) library driven by learned dynamics.
//!
//! A controller implementing [`ModelBasedPolicy`] receives observations of a batch of
//! agents, searches a low-cost sequence of actions over a fixed planning horizon with an
//! [`Optimizer`], evaluates candidate sequences with a [`TrajectorySimulator`] built on a
//! learned [`Dynamics`] model and a [`RewardFunction`], and returns the first action of the
//! best sequence.
//!
//! ```mermaid
//! graph LR
//!     Env --> Obs
//!     Obs --> MpcPolicy
//!     MpcPolicy --> Optimizer
//!     Optimizer --> TrajectorySimulator
//!     TrajectorySimulator --> Dynamics
//!     TrajectorySimulator --> RewardFunction
//!     MpcPolicy --> Act
//!     Act --> Env
//! ```
pub mod dummy;
pub mod error;
pub mod record;
pub mod rollout;

mod base;
pub use base::{BoxSpace, Env, Step};

mod compute;
pub use compute::ComputeContext;

pub mod dynamics;
pub use dynamics::{Dynamics, DynamicsHandle, EnsembleDynamics};

mod reward;
pub use reward::{FnReward, RewardFunction, RewardHandle};

mod simulator;
pub use simulator::{RolloutMode, SimulationOutput, TrajectorySimulator};

pub mod optimizer;
pub use optimizer::{Optimizer, OptimizerConfig, OptimizerOutput, PlanDistribution};

pub mod policy;
pub use policy::{
    ActOutput, BasePolicy, CemPolicy, ExplorationNoiseConfig, ModelBasedPolicy, MpcPolicy,
    MpcPolicyBuilder, MpcPolicyConfig, Pi2Policy, PolicyState, RandomShootingPolicy,
};
