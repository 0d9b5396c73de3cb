//! Model predictive control with learned dynamics.
//!
//! The library consists of the following crates:
//!
//! * [neuralmpc-core](neuralmpc_core) provides the [`ModelBasedPolicy`] interface, the
//!   trajectory simulator, the random shooting, CEM and PI2 optimizers, records and
//!   rollouts.
//! * [neuralmpc-candle](neuralmpc_candle) provides [`MlpDynamics`], a dynamics model
//!   with a multilayer perceptron trained with [candle](https://crates.io/crates/candle-core).
//! * [neuralmpc-envs](neuralmpc_envs) provides the pendulum environment, its exact
//!   dynamics and its reward functions.
//! * [neuralmpc-tensorboard](neuralmpc_tensorboard) has `TensorboardRecorder` to write
//!   records which can be shown in Tensorboard.
//!
//! This crate adds the [`runner`] module, which chains them: learning a dynamics model
//! from random rollouts and building MPC policies by optimizer name.
//!
//! [`ModelBasedPolicy`]: neuralmpc_core::ModelBasedPolicy
//! [`MlpDynamics`]: neuralmpc_candle::MlpDynamics
pub mod runner;
pub use neuralmpc_candle;
pub use neuralmpc_core;
pub use neuralmpc_envs;
pub use neuralmpc_tensorboard;
