//! # Trainer Module
//!
//! The on-policy training loop. Every epoch alternates
//! collect → update → clear until the epoch's step budget is spent, then
//! evaluates on separate environments, checkpoints on a new best reward and
//! asks the stop predicate whether to finish early.
//!
//! ```rust,no_run
//! use onpolicy::algorithms::UpdateRule;
//! use onpolicy::env::CartPole;
//! use onpolicy::policy::ActorCriticBuilder;
//! use onpolicy::trainer::{OnPolicyTrainer, TrainerConfig};
//!
//! let config = TrainerConfig::default();
//! let model = ActorCriticBuilder::new(4, 2)
//!     .hidden_sizes(config.hidden_sizes.clone())
//!     .seed(config.seed)
//!     .build()
//!     .unwrap();
//! let rule = UpdateRule::ppo_from(&config).unwrap();
//! let mut trainer = OnPolicyTrainer::from_config(config, rule, model, CartPole::new).unwrap();
//! let result = trainer.run().unwrap();
//! println!("best reward {} at epoch {}", result.best_reward, result.best_epoch);
//! ```

pub mod checkpoint;
pub mod config;

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::algorithms::{LossStats, UpdateRule};
use crate::data::{CollectRequest, CollectStats, Collector, ExperienceBuffer};
use crate::env::{Environment, VectorEnv};
use crate::error::{OnPolicyError, Result};
use crate::metrics::{EpochRecord, MetricsSink, MetricsTracker, Statistics};
use crate::policy::ActorCriticModel;

pub use checkpoint::{run_dir, CheckpointHook, FileCheckpoint};
pub use config::TrainerConfig;

/// Decides from an epoch's evaluation reward whether training is done
pub type StopFn = Box<dyn Fn(f32) -> bool>;

/// Stop predicate `reward >= threshold`, using the configured threshold first
/// and the environment's otherwise. Without either, training never stops early.
pub fn stop_fn_from_threshold(configured: Option<f32>, environment: Option<f32>) -> Option<StopFn> {
    match configured.or(environment) {
        Some(threshold) => Some(Box::new(move |reward| reward >= threshold)),
        None => {
            warn!("no reward threshold known; training runs the full epoch budget");
            None
        }
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Collecting,
    Updating,
    Evaluating,
    Checkpointing,
    Stopped,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingResult {
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub best_reward: f32,
    pub best_epoch: usize,
    /// Evaluation reward of the last epoch
    pub final_reward: f32,
    pub env_steps: usize,
    pub gradient_steps: usize,
    pub train_episodes: usize,
    pub test_episodes: usize,
    pub duration: Duration,
}

pub struct OnPolicyTrainer<M: ActorCriticModel> {
    config: TrainerConfig,
    rule: UpdateRule,
    model: M,
    train_collector: Collector,
    test_collector: Collector,
    stop_fn: Option<StopFn>,
    checkpoint: Option<Box<dyn CheckpointHook<M>>>,
    sinks: Vec<Box<dyn MetricsSink>>,
    tracker: MetricsTracker,
    state: TrainerState,
    rng: StdRng,
    env_steps: usize,
    gradient_steps: usize,
    test_episodes: usize,
}

impl<M: ActorCriticModel> OnPolicyTrainer<M> {
    /// The training collector must own a buffer; the test collector's buffer,
    /// if any, is never filled.
    pub fn new(
        config: TrainerConfig,
        rule: UpdateRule,
        model: M,
        train_collector: Collector,
        test_collector: Collector,
    ) -> Result<Self> {
        config.validate()?;
        if train_collector.buffer().is_none() {
            return Err(OnPolicyError::invalid_parameter(
                "train_collector",
                "needs an experience buffer",
            ));
        }
        for envs in [train_collector.envs(), test_collector.envs()] {
            if envs.observation_size() != model.observation_size() || envs.num_actions() != model.num_actions() {
                return Err(OnPolicyError::dimension_mismatch(
                    format!("obs {} / actions {}", model.observation_size(), model.num_actions()),
                    format!("obs {} / actions {}", envs.observation_size(), envs.num_actions()),
                ));
            }
        }

        Ok(OnPolicyTrainer {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            rule,
            model,
            train_collector,
            test_collector,
            stop_fn: None,
            checkpoint: None,
            sinks: Vec::new(),
            tracker: MetricsTracker::default(),
            state: TrainerState::Collecting,
            env_steps: 0,
            gradient_steps: 0,
            test_episodes: 0,
        })
    }

    /// Build both environment pools from `make_env`, seed everything from the
    /// config and stop on the configured or environment reward threshold.
    pub fn from_config<E, F>(config: TrainerConfig, rule: UpdateRule, model: M, mut make_env: F) -> Result<Self>
    where
        E: Environment + 'static,
        F: FnMut() -> E,
    {
        config.validate()?;
        let train_envs = VectorEnv::from_fn(config.training_num, &mut make_env)?.parallel(config.parallel_envs);
        let test_envs = VectorEnv::from_fn(config.test_num, &mut make_env)?.parallel(config.parallel_envs);
        let threshold = test_envs.reward_threshold();

        let mut train_collector = Collector::new(train_envs, Some(ExperienceBuffer::new(config.buffer_size)?));
        let mut test_collector = Collector::new(test_envs, None);
        train_collector.seed(config.seed);
        test_collector.seed(config.seed);

        let stop_fn = stop_fn_from_threshold(config.reward_threshold, threshold);
        let mut trainer = Self::new(config, rule, model, train_collector, test_collector)?;
        trainer.stop_fn = stop_fn;
        Ok(trainer)
    }

    pub fn with_stop_fn<F: Fn(f32) -> bool + 'static>(mut self, stop_fn: F) -> Self {
        self.stop_fn = Some(Box::new(stop_fn));
        self
    }

    pub fn without_stop_fn(mut self) -> Self {
        self.stop_fn = None;
        self
    }

    pub fn with_checkpoint<H: CheckpointHook<M> + 'static>(mut self, hook: H) -> Self {
        self.checkpoint = Some(Box::new(hook));
        self
    }

    pub fn with_sink<S: MetricsSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn rule(&self) -> &UpdateRule {
        &self.rule
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn train_collector(&self) -> &Collector {
        &self.train_collector
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.tracker
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    fn record_update(&mut self, losses: &LossStats) -> Result<()> {
        self.tracker.record_update(self.env_steps, losses)?;
        for sink in self.sinks.iter_mut() {
            sink.record_update(self.env_steps, losses)?;
        }
        Ok(())
    }

    fn record_epoch(&mut self, record: &EpochRecord) -> Result<()> {
        self.tracker.record_epoch(record)?;
        for sink in self.sinks.iter_mut() {
            sink.record_epoch(record)?;
        }
        Ok(())
    }

    /// Collect → update → clear until the epoch's step budget is spent
    fn train_epoch(&mut self) -> Result<(Vec<CollectStats>, Vec<LossStats>)> {
        let mut collected = Vec::new();
        let mut updates = Vec::new();
        let mut epoch_steps = 0;

        while epoch_steps < self.config.step_per_epoch {
            self.state = TrainerState::Collecting;
            let stats = self
                .train_collector
                .collect(&self.model, CollectRequest::Steps(self.config.collect_per_step))?;
            epoch_steps += stats.n_steps;
            self.env_steps += stats.n_steps;
            collected.push(stats);

            self.state = TrainerState::Updating;
            let buffer = self
                .train_collector
                .buffer_mut()
                .ok_or_else(|| OnPolicyError::TrainingError("training collector lost its buffer".to_string()))?;
            let batch = buffer.sample_all()?;
            buffer.clear();

            let losses = self.rule.update(&mut self.model, &batch, &mut self.rng)?;
            self.gradient_steps += losses.gradient_steps;
            debug!(env_steps = self.env_steps, total_loss = losses.total_loss, "update finished");
            self.record_update(&losses)?;
            updates.push(losses);
        }
        Ok((collected, updates))
    }

    fn evaluate(&mut self) -> Result<CollectStats> {
        self.state = TrainerState::Evaluating;
        self.test_collector.reset_env();
        let stats = self
            .test_collector
            .collect(&self.model, CollectRequest::Episodes(self.config.episode_per_test()))?;
        self.test_episodes += stats.n_episodes;
        Ok(stats)
    }

    /// Run until the stop predicate holds or the epoch budget is spent.
    /// Any environment or numerical error aborts the run.
    pub fn run(&mut self) -> Result<TrainingResult> {
        let start = Instant::now();
        let mut best: Option<(f32, usize)> = None;
        let mut epochs_run = 0;
        let mut final_reward = 0.0;
        let mut stopped_early = false;

        info!(
            task = %self.config.task,
            algorithm = self.rule.name(),
            epochs = self.config.epoch,
            "starting training"
        );

        for epoch in 1..=self.config.epoch {
            let (collected, updates) = self.train_epoch()?;
            let eval = self.evaluate()?;
            epochs_run = epoch;
            final_reward = eval.mean_reward;

            if best.map_or(true, |(reward, _)| eval.mean_reward > reward) {
                best = Some((eval.mean_reward, epoch));
                if let Some(hook) = self.checkpoint.as_mut() {
                    self.state = TrainerState::Checkpointing;
                    hook.save(&self.model, epoch, eval.mean_reward)?;
                    info!(epoch, reward = eval.mean_reward, "saved checkpoint");
                }
            }
            let (best_reward, best_epoch) = best.unwrap_or((eval.mean_reward, epoch));

            let train_rewards: Vec<f32> = collected.iter().flat_map(|c| c.episode_rewards.iter().copied()).collect();
            let train_lengths: Vec<f32> = collected
                .iter()
                .flat_map(|c| c.episode_lengths.iter().map(|&l| l as f32))
                .collect();
            let record = EpochRecord {
                epoch,
                env_steps: self.env_steps,
                gradient_steps: self.gradient_steps,
                train_reward: Statistics::from_slice(&train_rewards).mean,
                train_length: Statistics::from_slice(&train_lengths).mean,
                eval_reward: eval.mean_reward,
                eval_reward_std: eval.reward_std,
                best_reward,
                best_epoch,
                losses: LossStats::average(&updates),
            };
            self.record_epoch(&record)?;

            info!(
                epoch,
                env_steps = self.env_steps,
                train_reward = record.train_reward,
                eval_reward = record.eval_reward,
                eval_std = record.eval_reward_std,
                best_reward,
                best_epoch,
                "epoch finished"
            );

            if self.stop_fn.as_ref().map_or(false, |stop| stop(eval.mean_reward)) {
                info!(epoch, reward = eval.mean_reward, "stop criterion reached");
                stopped_early = true;
                break;
            }
        }
        self.state = TrainerState::Stopped;

        let (best_reward, best_epoch) = best.unwrap_or((0.0, 0));
        Ok(TrainingResult {
            epochs_run,
            stopped_early,
            best_reward,
            best_epoch,
            final_reward,
            env_steps: self.env_steps,
            gradient_steps: self.gradient_steps,
            train_episodes: self.train_collector.total_episodes(),
            test_episodes: self.test_episodes,
            duration: start.elapsed(),
        })
    }

    /// Play one episode on `env` with the current policy
    pub fn watch<E: Environment + 'static>(&self, env: E, render: f32) -> Result<CollectStats> {
        let mut collector = Collector::new(VectorEnv::new(vec![Box::new(env)])?, None);
        collector.seed(self.config.seed);
        collector.set_render(render)?;
        let stats = collector.collect(&self.model, CollectRequest::Episodes(1))?;
        info!(reward = stats.mean_reward, length = stats.mean_length, "watched one episode");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Step;
    use crate::policy::{ActorCritic, ActorCriticBuilder};
    use ndarray::{array, Array1};

    /// One-step episodes paying 1 for action 0
    struct OneStep;

    impl Environment for OneStep {
        fn observation_size(&self) -> usize {
            1
        }

        fn num_actions(&self) -> usize {
            2
        }

        fn reset(&mut self) -> Result<Array1<f32>> {
            Ok(array![1.0])
        }

        fn step(&mut self, action: usize) -> Result<Step> {
            Ok(Step {
                observation: array![0.0],
                reward: if action == 0 { 1.0 } else { 0.0 },
                done: true,
            })
        }

        fn seed(&mut self, _seed: u64) {}
    }

    fn small_config() -> TrainerConfig {
        TrainerConfig {
            epoch: 3,
            step_per_epoch: 8,
            collect_per_step: 4,
            training_num: 2,
            test_num: 2,
            buffer_size: 16,
            hidden_sizes: vec![4],
            ..TrainerConfig::a2c_defaults()
        }
    }

    fn model() -> ActorCritic {
        ActorCriticBuilder::new(1, 2).hidden_sizes(vec![4]).seed(0).build().unwrap()
    }

    #[test]
    fn test_runs_full_budget_without_threshold() {
        let config = small_config();
        let rule = UpdateRule::a2c_from(&config).unwrap();
        let mut trainer = OnPolicyTrainer::from_config(config, rule, model(), || OneStep).unwrap();

        let result = trainer.run().unwrap();
        assert_eq!(result.epochs_run, 3);
        assert!(!result.stopped_early);
        assert_eq!(result.env_steps, 24);
        // one A2C step per collect
        assert_eq!(result.gradient_steps, 6);
        assert_eq!(result.test_episodes, 6);
        assert_eq!(trainer.state(), TrainerState::Stopped);
        assert!(trainer.train_collector().buffer().unwrap().is_empty());
        assert_eq!(trainer.metrics().metrics().epochs.len(), 3);
        assert_eq!(trainer.metrics().update_count(), 6);
    }

    #[test]
    fn test_stop_fn_from_threshold() {
        assert!(stop_fn_from_threshold(None, None).is_none());
        let stop = stop_fn_from_threshold(Some(5.0), Some(100.0)).unwrap();
        assert!(stop(5.0));
        assert!(!stop(4.9));
        let stop = stop_fn_from_threshold(None, Some(100.0)).unwrap();
        assert!(!stop(5.0));
    }

    #[test]
    fn test_rejects_train_collector_without_buffer() {
        let config = small_config();
        let rule = UpdateRule::a2c_from(&config).unwrap();
        let train = Collector::new(VectorEnv::from_fn(1, || OneStep).unwrap(), None);
        let test = Collector::new(VectorEnv::from_fn(1, || OneStep).unwrap(), None);
        assert!(OnPolicyTrainer::new(config, rule, model(), train, test).is_err());
    }

    #[test]
    fn test_checkpoint_hook_sees_improvements_only() {
        use std::sync::{Arc, Mutex};

        let config = small_config();
        let rule = UpdateRule::a2c_from(&config).unwrap();
        let saves = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&saves);
        let mut trainer = OnPolicyTrainer::from_config(config, rule, model(), || OneStep)
            .unwrap()
            .with_checkpoint(move |_: &ActorCritic, epoch: usize, reward: f32| -> Result<()> {
                seen.lock().unwrap().push((epoch, reward));
                Ok(())
            });

        let result = trainer.run().unwrap();
        let saves = saves.lock().unwrap();
        assert_eq!(saves.first().map(|s| s.0), Some(1));
        assert!(saves.windows(2).all(|w| w[1].1 > w[0].1));
        assert_eq!(saves.last().map(|s| s.0), Some(result.best_epoch));
    }

    #[test]
    fn test_watch_plays_one_episode() {
        let config = small_config();
        let rule = UpdateRule::a2c_from(&config).unwrap();
        let trainer = OnPolicyTrainer::from_config(config, rule, model(), || OneStep).unwrap();
        let stats = trainer.watch(OneStep, 0.0).unwrap();
        assert_eq!(stats.n_episodes, 1);
        assert_eq!(stats.mean_length, 1.0);
    }

    #[test]
    fn test_render_only_slows_watch() {
        let config = TrainerConfig { render: 1.0, ..small_config() };
        let rule = UpdateRule::a2c_from(&config).unwrap();
        let mut trainer = OnPolicyTrainer::from_config(config, rule, model(), || OneStep).unwrap();

        // three evaluations of two episodes each; a delayed test pool would take seconds
        let result = trainer.run().unwrap();
        assert_eq!(result.test_episodes, 6);
        assert!(result.duration < Duration::from_millis(900), "run took {:?}", result.duration);

        let start = Instant::now();
        trainer.watch(OneStep, 0.02).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(trainer.watch(OneStep, f32::INFINITY).is_err());
    }
}
