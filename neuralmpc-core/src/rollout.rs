//! Recording episodes and building datasets of transitions.
use crate::{
    error::MpcError,
    record::{Record, RecordValue, Recorder},
    Env, ModelBasedPolicy,
};
use anyhow::Result;
use chrono::Local;
use log::info;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Observations, actions and rewards of an episode of a batch of agents.
///
/// `observations` has one more entry than `actions`: the observation at step `t` is
/// followed by the action taken at `t` and the observation it led to.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RolloutRecord {
    /// Observations, each `[num_agents, state_dim]`.
    pub observations: Vec<Array2<f32>>,

    /// Actions, each `[num_agents, action_dim]`.
    pub actions: Vec<Array2<f32>>,

    /// Rewards of each agent.
    pub rewards: Vec<Vec<f32>>,
}

impl RolloutRecord {
    /// The number of steps.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if no step has been taken.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Sum of the rewards of each agent.
    pub fn total_reward(&self) -> Vec<f32> {
        let n = self.rewards.first().map_or(0, |r| r.len());
        (0..n)
            .map(|i| self.rewards.iter().map(|r| r[i]).sum())
            .collect()
    }

    /// Iterates over `(observation, action, next_observation)`.
    pub fn transitions(
        &self,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>, ArrayView2<'_, f32>)> + '_
    {
        self.actions.iter().enumerate().filter_map(move |(t, a)| {
            let next = self.observations.get(t + 1)?;
            Some((self.observations[t].view(), a.view(), next.view()))
        })
    }

    /// Saves the record as JSON, creating the parent directory if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Loads a record saved with [`RolloutRecord::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let record = serde_json::from_reader(BufReader::new(file))?;
        Ok(record)
    }
}

fn mean(v: &[f32]) -> f32 {
    v.iter().sum::<f32>() / v.len().max(1) as f32
}

/// Runs an episode of `policy` in `env` for at most `horizon` steps.
///
/// Both are reset first. The episode ends early when any agent is done. One record per
/// step is written to `recorder` with the keys `t`, `datetime`, `reward`,
/// `predicted_reward` and `prediction_error` (mean absolute error of the predicted
/// observation), along with the record of the environment.
pub fn record_rollout<E, P, R>(
    env: &mut E,
    policy: &mut P,
    horizon: usize,
    exploration_noise: bool,
    recorder: &mut R,
) -> Result<RolloutRecord>
where
    E: Env,
    P: ModelBasedPolicy,
    R: Recorder + ?Sized,
{
    policy.reset()?;
    let mut obs = env.reset()?;
    let mut rollout = RolloutRecord::default();

    for t in 0..horizon {
        let out = policy.act(obs.view(), t, exploration_noise, true)?;
        let (step, record) = env.step(&out.action)?;

        let error = (&out.predicted_observation - &step.obs).mapv(f32::abs).mean();
        let mut record = record;
        record.insert("t", RecordValue::Scalar(t as f32));
        record.insert("datetime", RecordValue::DateTime(Local::now()));
        record.insert("reward", RecordValue::Scalar(mean(&step.reward)));
        record.insert(
            "predicted_reward",
            RecordValue::Scalar(out.predicted_reward.mean().unwrap_or(f32::NAN)),
        );
        record.insert(
            "prediction_error",
            RecordValue::Scalar(error.unwrap_or(f32::NAN)),
        );
        recorder.write(record);

        rollout.observations.push(obs);
        rollout.actions.push(step.act.clone());
        rollout.rewards.push(step.reward.clone());
        obs = step.obs.clone();
        if step.is_done() {
            break;
        }
    }
    rollout.observations.push(obs);

    info!(
        "Recorded a rollout of {} steps, total reward {:?}",
        rollout.len(),
        rollout.total_reward()
    );
    Ok(rollout)
}

/// Runs `n_rollouts` episodes of at most `horizon` steps with uniformly random actions.
pub fn collect_random_rollouts<E, G>(
    env: &mut E,
    n_rollouts: usize,
    horizon: usize,
    rng: &mut G,
) -> Result<Vec<RolloutRecord>>
where
    E: Env,
    G: Rng,
{
    let mut rollouts = Vec::with_capacity(n_rollouts);
    for _ in 0..n_rollouts {
        let mut obs = env.reset()?;
        let mut rollout = RolloutRecord::default();
        for _ in 0..horizon {
            let act = env.action_space().sample(rng, env.num_agents())?;
            let (step, _) = env.step(&act)?;
            rollout.observations.push(obs);
            rollout.actions.push(step.act.clone());
            rollout.rewards.push(step.reward.clone());
            obs = step.obs.clone();
            if step.is_done() {
                break;
            }
        }
        rollout.observations.push(obs);
        rollouts.push(rollout);
    }
    info!("Collected {} random rollouts", rollouts.len());
    Ok(rollouts)
}

fn stack(views: &[ArrayView2<f32>]) -> Result<Array2<f32>, MpcError> {
    concatenate(Axis(0), views).map_err(|e| MpcError::ConfigurationError(e.to_string()))
}

/// Transitions stacked row by row, used to fit dynamics models.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionDataset {
    /// States, `[n, state_dim]`.
    pub states: Array2<f32>,

    /// Actions, `[n, action_dim]`.
    pub actions: Array2<f32>,

    /// Next states, `[n, state_dim]`.
    pub next_states: Array2<f32>,
}

impl TransitionDataset {
    /// Stacks the transitions of all agents of all rollouts.
    pub fn from_rollouts(rollouts: &[RolloutRecord]) -> Result<Self, MpcError> {
        let (mut states, mut actions, mut next_states) = (vec![], vec![], vec![]);
        for (s, a, n) in rollouts.iter().flat_map(|r| r.transitions()) {
            states.push(s);
            actions.push(a);
            next_states.push(n);
        }
        if states.is_empty() {
            return Err(MpcError::ConfigurationError(
                "no transition in the rollouts".to_string(),
            ));
        }

        Ok(Self {
            states: stack(&states)?,
            actions: stack(&actions)?,
            next_states: stack(&next_states)?,
        })
    }

    /// The number of transitions.
    pub fn len(&self) -> usize {
        self.states.nrows()
    }

    /// Returns `true` if there is no transition.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transitions at the given rows.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            states: self.states.select(Axis(0), indices),
            actions: self.actions.select(Axis(0), indices),
            next_states: self.next_states.select(Axis(0), indices),
        }
    }

    /// Record of the sizes of the dataset.
    pub fn summary(&self) -> Record {
        Record::from_slice(&[
            ("transitions", RecordValue::Scalar(self.len() as f32)),
            ("state_dim", RecordValue::Scalar(self.states.ncols() as f32)),
            ("action_dim", RecordValue::Scalar(self.actions.ncols() as f32)),
        ])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dummy::{IntegratorDynamics, IntegratorEnv, IntegratorEnvConfig, QuadraticReward},
        record::BufferedRecorder,
        BoxSpace, MpcPolicyBuilder, MpcPolicyConfig, OptimizerConfig,
    };
    use ndarray::array;
    use rand::{rngs::SmallRng, SeedableRng};
    use std::sync::Arc;
    use tempdir::TempDir;

    fn env(num_agents: usize) -> IntegratorEnv {
        let config = IntegratorEnvConfig {
            num_agents,
            ..IntegratorEnvConfig::default()
        };
        IntegratorEnv::build(&config, 0).unwrap()
    }

    #[test]
    fn test_record_rollout() -> Result<()> {
        let mut env = env(2);
        let config = MpcPolicyConfig::default()
            .num_agents(2)
            .planning_horizon(3)
            .optimizer(OptimizerConfig::from_name("CEM")?.population_size(50));
        let mut policy = MpcPolicyBuilder::new(config)
            .dynamics(Arc::new(IntegratorDynamics::new(1, 1, 0.5)))
            .reward(Arc::new(QuadraticReward::new(array![0.0], 0.0)))
            .action_space(BoxSpace::uniform(1, -1.0, 1.0)?)
            .build()?;
        let mut recorder = BufferedRecorder::new();

        let rollout = record_rollout(&mut env, &mut policy, 20, false, &mut recorder)?;
        // Truncated by the environment after 10 steps.
        assert_eq!(rollout.len(), 10);
        assert_eq!(rollout.observations.len(), 11);
        assert_eq!(recorder.len(), 10);

        // The exact model predicts the next observation.
        let last = recorder.iter().last().unwrap();
        assert!(last.get_scalar("prediction_error")? < 1e-6);
        let first = recorder.iter().next().unwrap();
        assert!(first.get_datetime("datetime")? <= last.get_datetime("datetime")?);
        // The agents are driven towards the origin.
        assert!(rollout.observations[10].iter().all(|s| s.abs() < 0.1));
        Ok(())
    }

    #[test]
    fn test_random_rollouts_and_dataset() -> Result<()> {
        let mut env = env(3);
        let mut rng = SmallRng::seed_from_u64(0);
        let rollouts = collect_random_rollouts(&mut env, 4, 5, &mut rng)?;
        assert_eq!(rollouts.len(), 4);
        assert!(rollouts.iter().all(|r| r.len() == 5));

        let dataset = TransitionDataset::from_rollouts(&rollouts)?;
        assert_eq!(dataset.len(), 4 * 5 * 3);
        let expected = &dataset.states + &(&dataset.actions * 0.5);
        assert!((&dataset.next_states - &expected).iter().all(|d| d.abs() < 1e-6));
        assert_eq!(dataset.select(&[0, 2]).len(), 2);
        Ok(())
    }

    #[test]
    fn test_empty_dataset() {
        let result = TransitionDataset::from_rollouts(&[RolloutRecord::default()]);
        assert!(matches!(result, Err(MpcError::ConfigurationError(_))));
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let mut env = env(1);
        let mut rng = SmallRng::seed_from_u64(1);
        let rollout = collect_random_rollouts(&mut env, 1, 3, &mut rng)?.remove(0);

        let dir = TempDir::new("rollout")?;
        let path = dir.path().join("rollout.json");
        rollout.save(&path)?;
        let rollout_ = RolloutRecord::load(&path)?;
        assert_eq!(rollout, rollout_);
        assert_eq!(rollout.total_reward().len(), 1);
        Ok(())
    }
}
