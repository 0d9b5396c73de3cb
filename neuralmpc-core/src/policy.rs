//! Model-based policies.
mod base;
mod config;
mod mpc;
mod noise;
mod state;
pub use base::{ActOutput, BasePolicy, ModelBasedPolicy};
pub use config::MpcPolicyConfig;
pub use mpc::{CemPolicy, MpcPolicy, MpcPolicyBuilder, Pi2Policy, RandomShootingPolicy};
pub use noise::ExplorationNoiseConfig;
pub use state::PolicyState;
