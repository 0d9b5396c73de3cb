//! Trajectory optimizers.
//!
//! An [`Optimizer`] searches a low-cost sequence of actions for each agent, using a
//! [`TrajectorySimulator`](crate::TrajectorySimulator) as its objective. Three strategies
//! are provided:
//!
//! * [`RandomShooting`] samples a single batch of uniform sequences and keeps the best.
//! * [`Cem`], the cross-entropy method, refits a Gaussian to the elite candidates.
//! * [`Pi2`], path integral policy improvement, averages candidates weighted by their
//!   exponentiated negative cost.
mod base;
mod cem;
mod config;
mod pi2;
mod random_shooting;
pub use base::{Optimizer, OptimizerOutput, PlanDistribution};
pub use cem::{Cem, CemConfig};
pub use config::OptimizerConfig;
pub use pi2::{Pi2, Pi2Config};
pub use random_shooting::{RandomShooting, RandomShootingConfig};
