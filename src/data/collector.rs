use std::time::{Duration, Instant};

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{ExperienceBuffer, Transition};
use crate::env::VectorEnv;
use crate::error::{OnPolicyError, Result};
use crate::metrics::Statistics;
use crate::policy::ActorCriticModel;

/// How much to collect in one call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectRequest {
    /// Exactly this many transitions, summed over the pool
    Steps(usize),
    /// Until this many episodes have finished
    Episodes(usize),
}

/// Aggregate result of one `collect` call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectStats {
    pub n_steps: usize,
    pub n_episodes: usize,
    /// Mean return of the episodes finished during the call; 0 if none
    pub mean_reward: f32,
    pub reward_std: f32,
    pub mean_length: f32,
    pub steps_per_sec: f32,
    pub episode_rewards: Vec<f32>,
    pub episode_lengths: Vec<usize>,
}

/// Drives a policy through a pool of environments.
///
/// Each environment has its own in-flight segment. A segment is written to the
/// buffer in one piece when its episode ends, or at the end of the `collect`
/// call with its last transition marked `truncated`, so episode segments are
/// contiguous in the buffer no matter how many environments run.
pub struct Collector {
    envs: VectorEnv,
    buffer: Option<ExperienceBuffer>,
    /// `None` means the environment needs a reset before its next step
    observations: Vec<Option<Array1<f32>>>,
    segments: Vec<Vec<Transition>>,
    episode_rewards: Vec<f32>,
    episode_lengths: Vec<usize>,
    render: Option<Duration>,
    /// First environment of the next partial round of a step request
    cursor: usize,
    rng: StdRng,
    total_steps: usize,
    total_episodes: usize,
}

impl Collector {
    /// Without a buffer the collector only measures episodes (evaluation).
    pub fn new(envs: VectorEnv, buffer: Option<ExperienceBuffer>) -> Self {
        let n = envs.len();
        Collector {
            envs,
            buffer,
            observations: vec![None; n],
            segments: vec![Vec::new(); n],
            episode_rewards: vec![0.0; n],
            episode_lengths: vec![0; n],
            render: None,
            cursor: 0,
            rng: StdRng::from_entropy(),
            total_steps: 0,
            total_episodes: 0,
        }
    }

    /// Seed the environments and the action sampler
    pub fn seed(&mut self, seed: u64) {
        self.envs.seed(seed);
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Sleep this many seconds after every round of steps; zero disables it
    pub fn set_render(&mut self, seconds: f32) -> Result<()> {
        self.render = if seconds == 0.0 {
            None
        } else {
            let delay = Duration::try_from_secs_f32(seconds)
                .map_err(|e| OnPolicyError::invalid_parameter("render".to_string(), format!("{} ({})", e, seconds)))?;
            Some(delay)
        };
        Ok(())
    }

    pub fn envs(&self) -> &VectorEnv {
        &self.envs
    }

    pub fn buffer(&self) -> Option<&ExperienceBuffer> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut ExperienceBuffer> {
        self.buffer.as_mut()
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    /// Drop in-flight episodes; every environment starts fresh on the next step
    pub fn reset_env(&mut self) {
        for id in 0..self.envs.len() {
            self.observations[id] = None;
            self.segments[id].clear();
            self.episode_rewards[id] = 0.0;
            self.episode_lengths[id] = 0;
        }
    }

    /// Environment ids to step in the next round, or `None` once the request is met.
    /// A round shorter than the pool starts where the previous one stopped, so
    /// every environment advances at the same rate across calls.
    fn next_round(&mut self, request: CollectRequest, steps: usize, episodes: usize) -> Option<Vec<usize>> {
        let pool = self.envs.len();
        match request {
            CollectRequest::Steps(n) if steps < n => {
                let count = pool.min(n - steps);
                let mut ids: Vec<usize> = (0..count).map(|i| (self.cursor + i) % pool).collect();
                ids.sort_unstable();
                self.cursor = (self.cursor + count) % pool;
                Some(ids)
            }
            CollectRequest::Episodes(n) if episodes < n => Some((0..pool).collect()),
            _ => None,
        }
    }

    fn flush_segment(&mut self, id: usize, truncate: bool) {
        let mut segment = std::mem::take(&mut self.segments[id]);
        if truncate {
            if let Some(last) = segment.last_mut() {
                last.truncated = !last.done;
            }
        }
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.extend(segment);
        }
    }

    pub fn collect<P>(&mut self, policy: &P, request: CollectRequest) -> Result<CollectStats>
    where
        P: ActorCriticModel + ?Sized,
    {
        let target = match request {
            CollectRequest::Steps(n) | CollectRequest::Episodes(n) => n,
        };
        if target == 0 {
            return Err(OnPolicyError::invalid_parameter("collect request", "must ask for at least one step or episode"));
        }
        if policy.observation_size() != self.envs.observation_size() || policy.num_actions() != self.envs.num_actions() {
            return Err(OnPolicyError::dimension_mismatch(
                format!("obs {} / actions {}", self.envs.observation_size(), self.envs.num_actions()),
                format!("obs {} / actions {}", policy.observation_size(), policy.num_actions()),
            ));
        }

        let start = Instant::now();
        let mut n_steps = 0;
        let mut finished_rewards = Vec::new();
        let mut finished_lengths = Vec::new();

        while let Some(ids) = self.next_round(request, n_steps, finished_rewards.len()) {
            let needs_reset: Vec<usize> = ids.iter().copied().filter(|&id| self.observations[id].is_none()).collect();
            let fresh = self.envs.reset_at(&needs_reset)?;
            for (&id, obs) in needs_reset.iter().zip(fresh) {
                self.observations[id] = Some(obs);
            }

            let current: Vec<Array1<f32>> = ids
                .iter()
                .map(|&id| {
                    self.observations[id]
                        .clone()
                        .ok_or_else(|| OnPolicyError::environment(format!("environment {} has no observation", id)))
                })
                .collect::<Result<_>>()?;
            let mut obs_batch = Array2::zeros((current.len(), self.envs.observation_size()));
            for (mut row, obs) in obs_batch.rows_mut().into_iter().zip(current.iter()) {
                row.assign(obs);
            }

            let actions = policy.distribution(obs_batch.view())?.sample(&mut self.rng);
            let steps = self.envs.step_at(&ids, &actions)?;

            for (((&id, &action), observation), step) in ids.iter().zip(&actions).zip(current).zip(steps) {
                n_steps += 1;
                self.episode_rewards[id] += step.reward;
                self.episode_lengths[id] += 1;
                self.segments[id].push(Transition {
                    observation,
                    action,
                    reward: step.reward,
                    done: step.done,
                    next_observation: step.observation.clone(),
                    truncated: false,
                });

                if step.done {
                    if finished_rewards.len() < target || matches!(request, CollectRequest::Steps(_)) {
                        finished_rewards.push(self.episode_rewards[id]);
                        finished_lengths.push(self.episode_lengths[id]);
                    }
                    self.total_episodes += 1;
                    self.episode_rewards[id] = 0.0;
                    self.episode_lengths[id] = 0;
                    self.observations[id] = None;
                    self.flush_segment(id, false);
                } else {
                    self.observations[id] = Some(step.observation);
                }
            }

            if let Some(delay) = self.render {
                std::thread::sleep(delay);
            }
        }

        for id in 0..self.envs.len() {
            if !self.segments[id].is_empty() {
                self.flush_segment(id, true);
            }
        }
        self.total_steps += n_steps;

        let rewards = Statistics::from_slice(&finished_rewards);
        let lengths: Vec<f32> = finished_lengths.iter().map(|&l| l as f32).collect();
        let elapsed = start.elapsed().as_secs_f32().max(f32::EPSILON);

        Ok(CollectStats {
            n_steps,
            n_episodes: finished_rewards.len(),
            mean_reward: rewards.mean,
            reward_std: rewards.std,
            mean_length: Statistics::from_slice(&lengths).mean,
            steps_per_sec: n_steps as f32 / elapsed,
            episode_rewards: finished_rewards,
            episode_lengths: finished_lengths,
        })
    }
}
