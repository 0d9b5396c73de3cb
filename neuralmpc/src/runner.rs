//! Learning dynamics and building policies.
use anyhow::Result;
use log::info;
use neuralmpc_candle::{MlpDynamics, MlpDynamicsConfig};
use neuralmpc_core::{
    record::{Record, Recorder},
    rollout::{collect_random_rollouts, TransitionDataset},
    BoxSpace, DynamicsHandle, Env, MpcPolicy, MpcPolicyBuilder, MpcPolicyConfig,
    OptimizerConfig, RewardHandle,
};
use rand::{rngs::SmallRng, SeedableRng};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Fits an [`MlpDynamics`] to transitions of random rollouts in `env`.
///
/// ```mermaid
/// graph LR
///     A[Env]-->|uniform actions|B[RolloutRecord]
///     B -->|stacked|C[TransitionDataset]
///     C -->|fit|D[MlpDynamics]
/// ```
///
/// Returns the model and the record of its training.
pub fn learn_dynamics_from_randomness<E: Env>(
    env: &mut E,
    number_of_rollouts: usize,
    task_horizon: usize,
    config: MlpDynamicsConfig,
    seed: u64,
) -> Result<(MlpDynamics, Record)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let rollouts = collect_random_rollouts(env, number_of_rollouts, task_horizon, &mut rng)?;
    let dataset = TransitionDataset::from_rollouts(&rollouts)?;

    let state_dim = env.observation_space().dim();
    let action_dim = env.action_space().dim();
    let mut model = MlpDynamics::build(config, state_dim, action_dim)?;
    let record = model.fit(&dataset)?;
    info!(
        "Learned dynamics from {} transitions of {} random rollouts",
        dataset.len(),
        rollouts.len()
    );
    Ok((model, record))
}

/// Builds an MPC policy with the default configuration of the named optimizer.
///
/// `optimizer_name` is one of `"RandomShooting"`, `"CEM"` or `"PI2"`. When `recorder`
/// is given, the policy writes its diagnostics to it.
#[allow(clippy::too_many_arguments)]
pub fn make_mpc_policy(
    system_dynamics: DynamicsHandle,
    reward: RewardHandle,
    action_space: BoxSpace,
    observation_space: Option<BoxSpace>,
    num_agents: usize,
    planning_horizon: usize,
    optimizer_name: &str,
    recorder: Option<Box<dyn Recorder + Send>>,
) -> Result<MpcPolicy> {
    let config = MpcPolicyConfig::default()
        .num_agents(num_agents)
        .planning_horizon(planning_horizon)
        .optimizer(OptimizerConfig::from_name(optimizer_name)?);
    let mut builder = MpcPolicyBuilder::new(config)
        .dynamics(system_dynamics)
        .reward(reward)
        .action_space(action_space);
    if let Some(space) = observation_space {
        builder = builder.observation_space(space);
    }
    if let Some(recorder) = recorder {
        builder = builder.recorder(recorder);
    }
    Ok(builder.build()?)
}
