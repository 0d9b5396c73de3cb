use anyhow::Result;
use clap::Parser;
use neuralmpc::runner::{learn_dynamics_from_randomness, make_mpc_policy};
use neuralmpc_candle::{mlp::Activation, MlpDynamicsConfig};
use neuralmpc_core::{
    record::{RecordValue, Recorder},
    rollout::record_rollout,
    DynamicsHandle, Env as _, RewardHandle,
};
use neuralmpc_envs::{PendulumDynamics, PendulumEnv, PendulumEnvConfig, PendulumReward};
use neuralmpc_tensorboard::TensorboardRecorder;
use std::{path::Path, sync::Arc};

const UNITS: [usize; 3] = [32, 32, 32];
const EPOCHS: usize = 30;
const SEED: i64 = 42;

/// Control the pendulum with MPC on a dynamics model learned from random rollouts
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Optimizer of the action sequences: RandomShooting, CEM or PI2
    #[arg(short, long, default_value = "PI2")]
    optimizer: String,

    /// Plan with the exact dynamics of the pendulum instead of a learned model
    #[arg(short, long, default_value_t = false)]
    true_model: bool,

    /// The number of random rollouts for learning the dynamics
    #[arg(long, default_value_t = 40)]
    n_rollouts: usize,

    /// The length of each random rollout
    #[arg(long, default_value_t = 200)]
    task_horizon: usize,

    /// Planning horizon of the policy
    #[arg(short, long, default_value_t = 40)]
    planning_horizon: usize,

    /// The number of steps of the controlled episode
    #[arg(long, default_value_t = 300)]
    horizon: usize,

    /// The number of pendulums controlled together
    #[arg(short, long, default_value_t = 1)]
    num_agents: usize,

    /// Directory of the logs, the model and the recorded episode
    #[arg(short, long, default_value = "./tutorial_4")]
    log_dir: String,
}

fn env_config(num_agents: usize, max_steps: usize) -> PendulumEnvConfig {
    PendulumEnvConfig::default()
        .num_agents(num_agents)
        .max_steps(max_steps)
}

fn dynamics(args: &Args, log_dir: &Path) -> Result<DynamicsHandle> {
    if args.true_model {
        return Ok(Arc::new(PendulumDynamics::default()));
    }

    let mut env = PendulumEnv::build(&env_config(1, args.task_horizon), SEED)?;
    let config = MlpDynamicsConfig::default()
        .units(UNITS.to_vec())
        .activation(Activation::Tanh)
        .epochs(EPOCHS);
    let (model, mut record) =
        learn_dynamics_from_randomness(&mut env, args.n_rollouts, args.task_horizon, config, 0)?;
    let mut recorder = TensorboardRecorder::new(log_dir.join("dynamics")).step_key("epoch");
    record.insert("epoch", RecordValue::Scalar(EPOCHS as f32));
    recorder.write(record);
    model.save(log_dir.join("model"))?;
    Ok(Arc::new(model))
}

fn run(args: &Args) -> Result<f32> {
    let log_dir = Path::new(&args.log_dir);
    let dynamics = dynamics(args, log_dir)?;
    let reward: RewardHandle = Arc::new(PendulumReward);

    let mut env = PendulumEnv::build(&env_config(args.num_agents, args.horizon), SEED + 1)?;
    let policy_recorder = TensorboardRecorder::new(log_dir.join("policy"));
    let mut policy = make_mpc_policy(
        dynamics,
        reward,
        env.action_space().clone(),
        Some(env.observation_space().clone()),
        args.num_agents,
        args.planning_horizon,
        &args.optimizer,
        Some(Box::new(policy_recorder)),
    )?;

    let mut recorder = TensorboardRecorder::new(log_dir.join("episode"));
    let rollout = record_rollout(&mut env, &mut policy, args.horizon, false, &mut recorder)?;
    rollout.save(log_dir.join("episode.json"))?;

    let total = rollout.total_reward();
    let mean = total.iter().sum::<f32>() / total.len().max(1) as f32;
    Ok(mean)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let total_reward = run(&args)?;
    log::info!("Mean total reward of the episode: {}", total_reward);

    Ok(())
}
