//! # Policy Update Module
//!
//! The two on-policy update rules and what they share.
//!
//! - **A2C** takes one gradient step on the whole collected batch, using
//!   Monte-Carlo advantages `R_t - V(s_t)`.
//! - **PPO** makes several shuffled minibatch passes over the batch with the
//!   clipped surrogate objective, GAE advantages and optional dual and value
//!   clipping.
//!
//! Both are variants of [`UpdateRule`]; the trainer never needs to know which
//! one it is driving.
//!
//! ```rust,no_run
//! use onpolicy::algorithms::UpdateRule;
//! use onpolicy::trainer::TrainerConfig;
//!
//! let config = TrainerConfig::default();
//! let rule = UpdateRule::ppo_from(&config).unwrap();
//! assert_eq!(rule.name(), "ppo");
//! ```

pub mod a2c;
pub mod advantage;
pub mod ppo;

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::data::TrajectoryBatch;
use crate::error::{OnPolicyError, Result};
use crate::optimizer::GradientClipper;
use crate::policy::ActorCriticModel;
use crate::trainer::TrainerConfig;

pub use a2c::A2c;
pub use advantage::{AdvantageEstimator, Targets};
pub use ppo::Ppo;

/// Loss statistics of one update call (means over its gradient steps)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LossStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub total_loss: f32,
    /// Global gradient norm before clipping
    pub grad_norm: f32,
    /// Mean `log π_old - log π_new` over the data; 0 for A2C
    pub approx_kl: f32,
    /// Share of samples whose ratio left the clip range; 0 for A2C
    pub clip_fraction: f32,
    pub gradient_steps: usize,
}

impl LossStats {
    /// Mean of every field except `gradient_steps`, which is summed
    pub fn average(stats: &[LossStats]) -> LossStats {
        if stats.is_empty() {
            return LossStats::default();
        }
        let n = stats.len() as f32;
        let mean = |f: fn(&LossStats) -> f32| stats.iter().map(f).sum::<f32>() / n;
        LossStats {
            policy_loss: mean(|s| s.policy_loss),
            value_loss: mean(|s| s.value_loss),
            entropy: mean(|s| s.entropy),
            total_loss: mean(|s| s.total_loss),
            grad_norm: mean(|s| s.grad_norm),
            approx_kl: mean(|s| s.approx_kl),
            clip_fraction: mean(|s| s.clip_fraction),
            gradient_steps: stats.iter().map(|s| s.gradient_steps).sum(),
        }
    }
}

/// An on-policy update rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateRule {
    A2c(A2c),
    Ppo(Ppo),
}

impl UpdateRule {
    pub fn a2c_from(config: &TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(UpdateRule::A2c(A2c {
            learning_rate: config.lr,
            gamma: config.gamma,
            vf_coef: config.vf_coef,
            ent_coef: config.ent_coef,
            max_grad_norm: config.max_grad_norm,
            rew_norm: config.rew_norm,
        }))
    }

    pub fn ppo_from(config: &TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(UpdateRule::Ppo(Ppo {
            learning_rate: config.lr,
            gamma: config.gamma,
            gae_lambda: config.gae_lambda,
            eps_clip: config.eps_clip,
            dual_clip: config.dual_clip,
            value_clip: config.value_clip,
            vf_coef: config.vf_coef,
            ent_coef: config.ent_coef,
            max_grad_norm: config.max_grad_norm,
            rew_norm: config.rew_norm,
            repeat: config.repeat_per_collect,
            batch_size: config.batch_size,
        }))
    }

    /// Short name used in log paths
    pub fn name(&self) -> &'static str {
        match self {
            UpdateRule::A2c(_) => "a2c",
            UpdateRule::Ppo(_) => "ppo",
        }
    }

    /// Run the rule over one collected batch
    pub fn update<M, R>(&self, model: &mut M, batch: &TrajectoryBatch, rng: &mut R) -> Result<LossStats>
    where
        M: ActorCriticModel + ?Sized,
        R: Rng + ?Sized,
    {
        if batch.is_empty() {
            return Err(OnPolicyError::EmptyBuffer("nothing to learn from".to_string()));
        }
        match self {
            UpdateRule::A2c(a2c) => a2c.update(model, batch),
            UpdateRule::Ppo(ppo) => ppo.update(model, batch, rng),
        }
    }
}

/// Backpropagate, clip and apply one step. Nothing is applied when the loss or
/// the gradient norm is not finite. Returns the pre-clip gradient norm.
pub(crate) fn gradient_step<M>(
    model: &mut M,
    loss: f32,
    logit_grads: ArrayView2<f32>,
    value_grads: ArrayView1<f32>,
    max_grad_norm: Option<f32>,
    learning_rate: f32,
) -> Result<f32>
where
    M: ActorCriticModel + ?Sized,
{
    OnPolicyError::ensure_finite("loss", loss)?;
    let mut gradients = model.backward(logit_grads, value_grads)?;
    let norm = GradientClipper::from_max_norm(max_grad_norm).clip(&mut gradients.weights, &mut gradients.biases);
    OnPolicyError::ensure_finite("gradient norm", norm)?;
    if !gradients.is_finite() {
        return Err(OnPolicyError::NumericalError("gradient contains non-finite entries".to_string()));
    }
    model.apply_gradients(&gradients, learning_rate)?;
    Ok(norm)
}
