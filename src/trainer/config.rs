use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::{OnPolicyError, Result};

/// Every option of a training run.
///
/// `Default` gives the PPO CartPole setup; [`TrainerConfig::a2c_defaults`]
/// gives the A2C one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Task identifier, used in log and checkpoint paths
    pub task: String,
    pub seed: u64,
    pub buffer_size: usize,
    pub lr: f32,
    pub gamma: f32,
    /// Maximum number of epochs
    pub epoch: usize,
    /// Environment steps to collect per epoch
    pub step_per_epoch: usize,
    /// Environment steps to collect before each update
    pub collect_per_step: usize,
    /// PPO passes over each collected batch
    pub repeat_per_collect: usize,
    /// PPO minibatch size
    pub batch_size: usize,
    /// Number of parallel training environments
    pub training_num: usize,
    /// Number of parallel evaluation environments
    pub test_num: usize,
    /// Evaluation episodes per epoch; defaults to `test_num`
    pub episode_per_test: Option<usize>,
    pub vf_coef: f32,
    pub ent_coef: f32,
    pub max_grad_norm: Option<f32>,
    pub eps_clip: f32,
    pub gae_lambda: f32,
    pub rew_norm: bool,
    pub dual_clip: Option<f32>,
    pub value_clip: bool,
    /// Stop once the evaluation reward reaches this; falls back to the
    /// environment's own threshold
    pub reward_threshold: Option<f32>,
    /// Seconds to pause after each step of a watch run
    pub render: f32,
    /// Step environments on the rayon thread pool
    pub parallel_envs: bool,
    pub logdir: String,
    /// Distinguishes runs of the same task and algorithm in `logdir`
    pub note: Option<String>,
    pub hidden_sizes: Vec<usize>,
    pub shared_trunk: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            task: "CartPole-v0".to_string(),
            seed: 0,
            buffer_size: 20000,
            lr: 1e-3,
            gamma: 0.99,
            epoch: 10,
            step_per_epoch: 2000,
            collect_per_step: 20,
            repeat_per_collect: 2,
            batch_size: 64,
            training_num: 20,
            test_num: 100,
            episode_per_test: None,
            vf_coef: 0.5,
            ent_coef: 0.0,
            max_grad_norm: Some(0.5),
            eps_clip: 0.2,
            gae_lambda: 1.0,
            rew_norm: true,
            dual_clip: None,
            value_clip: true,
            reward_threshold: None,
            render: 0.0,
            parallel_envs: false,
            logdir: "log".to_string(),
            note: None,
            hidden_sizes: vec![128, 128],
            shared_trunk: true,
        }
    }
}

impl TrainerConfig {
    /// A2C setup: no reward normalization, no gradient clipping, one pass
    pub fn a2c_defaults() -> Self {
        TrainerConfig {
            seed: 1626,
            lr: 3e-4,
            gamma: 0.9,
            epoch: 100,
            step_per_epoch: 1000,
            collect_per_step: 100,
            repeat_per_collect: 1,
            training_num: 8,
            test_num: 8,
            ent_coef: 0.001,
            max_grad_norm: None,
            rew_norm: false,
            value_clip: false,
            hidden_sizes: vec![128, 128, 128],
            ..TrainerConfig::default()
        }
    }

    pub fn episode_per_test(&self) -> usize {
        self.episode_per_test.unwrap_or(self.test_num)
    }

    /// Reject values no run could use
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("buffer_size", self.buffer_size),
            ("epoch", self.epoch),
            ("step_per_epoch", self.step_per_epoch),
            ("collect_per_step", self.collect_per_step),
            ("repeat_per_collect", self.repeat_per_collect),
            ("batch_size", self.batch_size),
            ("training_num", self.training_num),
            ("test_num", self.test_num),
            ("episode_per_test", self.episode_per_test()),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(OnPolicyError::invalid_parameter(*name, "must be positive"));
        }

        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return Err(OnPolicyError::invalid_parameter("lr", "must be positive"));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(OnPolicyError::invalid_parameter("gamma", "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(OnPolicyError::invalid_parameter("gae_lambda", "must be in [0, 1]"));
        }
        if !(self.vf_coef >= 0.0) || !(self.ent_coef >= 0.0) {
            return Err(OnPolicyError::invalid_parameter("vf_coef/ent_coef", "must be non-negative"));
        }
        if !(self.eps_clip > 0.0) {
            return Err(OnPolicyError::invalid_parameter("eps_clip", "must be positive"));
        }
        if matches!(self.max_grad_norm, Some(n) if !(n > 0.0)) {
            return Err(OnPolicyError::invalid_parameter("max_grad_norm", "must be positive"));
        }
        if matches!(self.dual_clip, Some(c) if !(c > 1.0)) {
            return Err(OnPolicyError::invalid_parameter("dual_clip", "must be greater than 1"));
        }
        if !(self.render >= 0.0 && self.render.is_finite()) {
            return Err(OnPolicyError::invalid_parameter("render", "must be finite and non-negative"));
        }
        if self.hidden_sizes.iter().any(|&h| h == 0) || (self.shared_trunk && self.hidden_sizes.is_empty()) {
            return Err(OnPolicyError::invalid_parameter("hidden_sizes", "need positive sizes, at least one with a shared trunk"));
        }
        Ok(())
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: TrainerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }
}
