//! Pendulum swing-up.
//!
//! A pendulum of unit mass and length hangs from a frictionless pivot. The state is the
//! angle `θ` from the upright position and the angular velocity `θ̇`; an agent observes
//! `[cos θ, sin θ, θ̇]` and applies a torque `u` in `[-2, 2]`. The goal is to keep the
//! pendulum upright:
//!
//! ```text
//! r = -(θ² + 0.1 θ̇² + 0.001 u²)
//! ```
mod dynamics;
mod env;
mod reward;
pub use dynamics::PendulumDynamics;
pub use env::{PendulumEnv, PendulumEnvConfig};
pub use reward::{pendulum_actions_reward, pendulum_state_reward, PendulumReward};

/// Gravity.
pub const GRAVITY: f32 = 10.0;

/// Time step.
pub const DT: f32 = 0.05;

/// Largest angular velocity.
pub const MAX_SPEED: f32 = 8.0;

/// Largest torque.
pub const MAX_TORQUE: f32 = 2.0;

/// Advances `(θ, θ̇)` by one time step under torque `u`, clipped to the torque limit.
pub fn integrate(theta: f32, thdot: f32, u: f32, g: f32) -> (f32, f32) {
    let (m, l) = (1.0, 1.0);
    let u = u.max(-MAX_TORQUE).min(MAX_TORQUE);
    let gravity = -3.0 * g / (2.0 * l) * (theta + std::f32::consts::PI).sin();
    let thdot = thdot + (gravity + 3.0 / (m * l * l) * u) * DT;
    let thdot = thdot.max(-MAX_SPEED).min(MAX_SPEED);
    (theta + thdot * DT, thdot)
}

/// Wraps an angle into `[-π, π)`.
pub fn angle_normalize(x: f32) -> f32 {
    use std::f32::consts::PI;
    (x + PI).rem_euclid(2.0 * PI) - PI
}
