use anyhow::Result;
use ndarray::Array2;
use neuralmpc::runner::make_mpc_policy;
use neuralmpc_core::{
    dummy::DivergingDynamics, error::MpcError, record::NullRecorder, rollout::record_rollout,
    DynamicsHandle, Env, ModelBasedPolicy, MpcPolicy, MpcPolicyBuilder, MpcPolicyConfig,
    OptimizerConfig,
};
use neuralmpc_envs::{PendulumDynamics, PendulumEnv, PendulumEnvConfig, PendulumReward};
use std::sync::Arc;
use test_log::test;

fn policy(env: &PendulumEnv, dynamics: DynamicsHandle, optimizer: &str) -> Result<MpcPolicy> {
    make_mpc_policy(
        dynamics,
        Arc::new(PendulumReward),
        env.action_space().clone(),
        Some(env.observation_space().clone()),
        env.num_agents(),
        15,
        optimizer,
        None,
    )
}

fn episode_reward<F>(env: &mut PendulumEnv, steps: usize, mut act: F) -> Result<(f32, Array2<f32>)>
where
    F: FnMut(&Array2<f32>, usize) -> Result<Array2<f32>>,
{
    env.reset()?;
    env.set_state(0.3, 0.0);
    let mut obs = env.observations();
    let mut total = 0.0;
    for t in 0..steps {
        let a = act(&obs, t)?;
        let (step, _) = env.step(&a)?;
        total += step.reward[0];
        obs = step.obs;
    }
    Ok((total, obs))
}

#[test]
fn test_mpc_keeps_pendulum_upright() -> Result<()> {
    let mut env = PendulumEnv::build(&PendulumEnvConfig::default(), 0)?;
    let mut mpc = policy(&env, Arc::new(PendulumDynamics::default()), "CEM")?;
    mpc.reset()?;

    let (mpc_total, last_obs) = episode_reward(&mut env, 40, |obs, t| {
        Ok(mpc.act(obs.view(), t, false, false)?.action)
    })?;
    let (passive_total, _) = episode_reward(&mut env, 40, |_, _| Ok(Array2::zeros((1, 1))))?;

    assert!(
        mpc_total > passive_total,
        "mpc {} passive {}",
        mpc_total,
        passive_total
    );
    assert!(last_obs[[0, 0]] > 0.9, "cos θ = {}", last_obs[[0, 0]]);
    Ok(())
}

#[test]
fn test_divergence_reaches_caller() -> Result<()> {
    let mut env = PendulumEnv::build(&PendulumEnvConfig::default(), 0)?;
    let mut mpc = policy(&env, Arc::new(DivergingDynamics::always(3, 1)), "PI2")?;

    let err = record_rollout(&mut env, &mut mpc, 5, false, &mut NullRecorder::new())
        .err()
        .expect("rollout must fail");
    assert!(matches!(
        err.downcast_ref::<MpcError>(),
        Some(MpcError::DivergedRolloutError(_))
    ));
    Ok(())
}

#[test]
fn test_policies_sharing_dynamics_are_independent() -> Result<()> {
    let env = PendulumEnv::build(&PendulumEnvConfig::default(), 0)?;
    let dynamics: DynamicsHandle = Arc::new(PendulumDynamics::default());
    let obs1 = ndarray::array![[1.0f32, 0.0, 0.5]];
    let obs2 = ndarray::array![[0.0f32, -1.0, -2.0]];

    let mut p1 = policy(&env, dynamics.clone(), "RandomShooting")?;
    let mut p2 = policy(&env, dynamics.clone(), "RandomShooting")?;
    let mut interleaved = vec![];
    for t in 0..3 {
        interleaved.push(p1.act(obs1.view(), t, true, false)?.action);
        p2.act(obs2.view(), t, true, false)?;
    }

    let mut alone = policy(&env, dynamics, "RandomShooting")?;
    for (t, expected) in interleaved.iter().enumerate() {
        assert_eq!(&alone.act(obs1.view(), t, true, false)?.action, expected);
    }
    Ok(())
}

#[test]
fn test_agents_are_planned_separately() -> Result<()> {
    let env = PendulumEnv::build(&PendulumEnvConfig::default().num_agents(2), 0)?;
    let config = MpcPolicyConfig::default()
        .num_agents(2)
        .planning_horizon(10)
        .optimizer(OptimizerConfig::from_name("CEM")?.population_size(200));
    let mut mpc = MpcPolicyBuilder::new(config)
        .dynamics(Arc::new(PendulumDynamics::default()))
        .reward(Arc::new(PendulumReward))
        .action_space(env.action_space().clone())
        .build()?;

    // Tilted to opposite sides, the agents push in opposite directions.
    let obs = ndarray::array![[0.98f32, 0.2, 0.0], [0.98, -0.2, 0.0]];
    let out = mpc.act(obs.view(), 0, false, false)?;
    assert!(out.action[[0, 0]] < 0.0, "{:?}", out.action);
    assert!(out.action[[1, 0]] > 0.0, "{:?}", out.action);
    Ok(())
}
