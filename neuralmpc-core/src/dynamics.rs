//! Learned or analytic models of system dynamics.
mod base;
mod ensemble;
pub use base::{check_batch, Dynamics, DynamicsHandle};
pub use ensemble::EnsembleDynamics;
