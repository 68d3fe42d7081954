//! # Environment Module
//!
//! The simulator side of the pipeline. An [`Environment`] advances one episode
//! stream through `reset`/`step`; a [`VectorEnv`] owns a fixed, ordered pool of
//! them and steps the requested members in lockstep, optionally on the rayon
//! thread pool.

pub mod cartpole;

use ndarray::Array1;
use ndarray::parallel::prelude::*;

use crate::error::{OnPolicyError, Result};

pub use cartpole::CartPole;

/// Result of one environment step
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub observation: Array1<f32>,
    pub reward: f32,
    pub done: bool,
}

/// A single episodic simulator with a discrete action space.
pub trait Environment: Send {
    fn observation_size(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Array1<f32>>;

    fn step(&mut self, action: usize) -> Result<Step>;

    fn seed(&mut self, seed: u64);

    /// Average episode reward at which the task counts as solved, if known
    fn reward_threshold(&self) -> Option<f32> {
        None
    }
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn observation_size(&self) -> usize {
        (**self).observation_size()
    }

    fn num_actions(&self) -> usize {
        (**self).num_actions()
    }

    fn reset(&mut self) -> Result<Array1<f32>> {
        (**self).reset()
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        (**self).step(action)
    }

    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }

    fn reward_threshold(&self) -> Option<f32> {
        (**self).reward_threshold()
    }
}

/// An ordered pool of environments stepped in lockstep.
pub struct VectorEnv {
    envs: Vec<Box<dyn Environment>>,
    parallel: bool,
}

impl VectorEnv {
    pub fn new(envs: Vec<Box<dyn Environment>>) -> Result<Self> {
        let first = envs
            .first()
            .ok_or_else(|| OnPolicyError::invalid_parameter("envs", "pool needs at least one environment"))?;
        let (obs, actions) = (first.observation_size(), first.num_actions());
        if let Some(other) = envs.iter().find(|e| e.observation_size() != obs || e.num_actions() != actions) {
            return Err(OnPolicyError::dimension_mismatch(
                format!("obs {} / actions {}", obs, actions),
                format!("obs {} / actions {}", other.observation_size(), other.num_actions()),
            ));
        }
        Ok(VectorEnv { envs, parallel: false })
    }

    /// Build a pool of `n` environments from a factory
    pub fn from_fn<E, F>(n: usize, mut make: F) -> Result<Self>
    where
        E: Environment + 'static,
        F: FnMut() -> E,
    {
        let envs = (0..n).map(|_| Box::new(make()) as Box<dyn Environment>).collect();
        Self::new(envs)
    }

    /// Step pool members on the rayon thread pool instead of sequentially
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    pub fn observation_size(&self) -> usize {
        self.envs[0].observation_size()
    }

    pub fn num_actions(&self) -> usize {
        self.envs[0].num_actions()
    }

    pub fn reward_threshold(&self) -> Option<f32> {
        self.envs[0].reward_threshold()
    }

    /// Seed member `i` with `seed + i`
    pub fn seed(&mut self, seed: u64) {
        for (i, env) in self.envs.iter_mut().enumerate() {
            env.seed(seed.wrapping_add(i as u64));
        }
    }

    pub fn reset_all(&mut self) -> Result<Vec<Array1<f32>>> {
        let ids: Vec<usize> = (0..self.envs.len()).collect();
        self.reset_at(&ids)
    }

    /// Reset the listed members, returning observations in `ids` order
    pub fn reset_at(&mut self, ids: &[usize]) -> Result<Vec<Array1<f32>>> {
        ids.iter()
            .map(|&id| {
                let len = self.envs.len();
                self.envs
                    .get_mut(id)
                    .ok_or_else(|| OnPolicyError::invalid_parameter("env_id".to_string(), format!("{} >= pool size {}", id, len)))?
                    .reset()
            })
            .collect()
    }

    /// Step every member with one action each
    pub fn step(&mut self, actions: &[usize]) -> Result<Vec<Step>> {
        let ids: Vec<usize> = (0..self.envs.len()).collect();
        self.step_at(&ids, actions)
    }

    /// Step the listed members, one action per id; results come back in `ids` order.
    /// The first failing member aborts the whole round.
    pub fn step_at(&mut self, ids: &[usize], actions: &[usize]) -> Result<Vec<Step>> {
        if ids.len() != actions.len() {
            return Err(OnPolicyError::dimension_mismatch(
                format!("{} actions", ids.len()),
                format!("{} actions", actions.len()),
            ));
        }

        let mut requests: Vec<Option<usize>> = vec![None; self.envs.len()];
        for (&id, &action) in ids.iter().zip(actions) {
            match requests.get_mut(id) {
                Some(slot) if slot.is_none() => *slot = Some(action),
                Some(_) => {
                    return Err(OnPolicyError::invalid_parameter(
                        "env_id".to_string(),
                        format!("environment {} requested twice", id),
                    ))
                }
                None => {
                    return Err(OnPolicyError::invalid_parameter(
                        "env_id".to_string(),
                        format!("{} >= pool size {}", id, self.envs.len()),
                    ))
                }
            }
        }

        let step_one = |(env, request): (&mut Box<dyn Environment>, &Option<usize>)| {
            request.map(|action| env.step(action))
        };
        let mut results: Vec<Option<Result<Step>>> = if self.parallel {
            self.envs.par_iter_mut().zip(requests.par_iter()).map(step_one).collect()
        } else {
            self.envs.iter_mut().zip(requests.iter()).map(step_one).collect()
        };

        ids.iter()
            .map(|&id| {
                results[id]
                    .take()
                    .unwrap_or_else(|| Err(OnPolicyError::environment(format!("environment {} was not stepped", id))))
            })
            .collect()
    }
}
