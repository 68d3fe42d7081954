use ndarray::{Array1, Axis, Zip};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::advantage::{compute_targets, AdvantageEstimator};
use super::{gradient_step, LossStats};
use crate::data::TrajectoryBatch;
use crate::distributions::CategoricalBatch;
use crate::error::Result;
use crate::policy::ActorCriticModel;

/// Proximal Policy Optimization with the clipped surrogate objective.
///
/// Old log-probabilities and values come from the policy as it was when
/// `update` was called and stay fixed for all `repeat` passes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Ppo {
    pub learning_rate: f32,
    pub gamma: f32,
    pub gae_lambda: f32,
    pub eps_clip: f32,
    /// Lower bound `c > 1` on the objective of negative-advantage samples
    pub dual_clip: Option<f32>,
    /// Clip the new value estimate to within `eps_clip` of the old one
    pub value_clip: bool,
    pub vf_coef: f32,
    pub ent_coef: f32,
    pub max_grad_norm: Option<f32>,
    pub rew_norm: bool,
    pub repeat: usize,
    pub batch_size: usize,
}

/// Per-sample surrogate objective `min(ρA, clip(ρ, 1-ε, 1+ε)A)`, floored at
/// `cA` for negative advantages when a dual-clip bound is given.
pub fn clipped_surrogate(ratio: f32, advantage: f32, eps_clip: f32, dual_clip: Option<f32>) -> f32 {
    let surr1 = ratio * advantage;
    let surr2 = ratio.clamp(1.0 - eps_clip, 1.0 + eps_clip) * advantage;
    let objective = surr1.min(surr2);
    match dual_clip {
        Some(c) if advantage < 0.0 => objective.max(c * advantage),
        _ => objective,
    }
}

/// d objective / d log π(a|s), given the same inputs as [`clipped_surrogate`]
fn surrogate_grad(ratio: f32, advantage: f32, eps_clip: f32, dual_clip: Option<f32>) -> f32 {
    let surr1 = ratio * advantage;
    let surr2 = ratio.clamp(1.0 - eps_clip, 1.0 + eps_clip) * advantage;
    if let Some(c) = dual_clip {
        if advantage < 0.0 && c * advantage > surr1.min(surr2) {
            return 0.0;
        }
    }
    let in_range = (1.0 - eps_clip..=1.0 + eps_clip).contains(&ratio);
    if surr1 <= surr2 || in_range {
        advantage * ratio
    } else {
        0.0
    }
}

impl Ppo {
    pub fn update<M, R>(&self, model: &mut M, batch: &TrajectoryBatch, rng: &mut R) -> Result<LossStats>
    where
        M: ActorCriticModel + ?Sized,
        R: Rng + ?Sized,
    {
        let old = model.predict(batch.observations.view())?;
        let old_log_probs = CategoricalBatch::from_logits(old.logits.view())?.log_probs(&batch.actions)?;
        let old_values = old.values;
        let next_values = model.predict(batch.next_observations.view())?.values;

        let targets = compute_targets(
            batch,
            old_values.view(),
            next_values.view(),
            self.gamma,
            AdvantageEstimator::Gae { lambda: self.gae_lambda },
            self.rew_norm,
        )?;

        let mut indices: Vec<usize> = (0..batch.len()).collect();
        let mut steps = Vec::with_capacity(self.repeat * (batch.len() / self.batch_size.max(1) + 1));

        for _ in 0..self.repeat {
            indices.shuffle(rng);
            for chunk in indices.chunks(self.batch_size.max(1)) {
                let stats = self.minibatch_step(
                    model,
                    batch,
                    chunk,
                    old_log_probs.select(Axis(0), chunk),
                    old_values.select(Axis(0), chunk),
                    targets.returns.select(Axis(0), chunk),
                    targets.advantages.select(Axis(0), chunk),
                )?;
                steps.push(stats);
            }
        }

        let stats = LossStats::average(&steps);
        debug!(
            policy_loss = stats.policy_loss,
            value_loss = stats.value_loss,
            entropy = stats.entropy,
            approx_kl = stats.approx_kl,
            clip_fraction = stats.clip_fraction,
            gradient_steps = stats.gradient_steps,
            "ppo update"
        );
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn minibatch_step<M>(
        &self,
        model: &mut M,
        batch: &TrajectoryBatch,
        chunk: &[usize],
        old_log_probs: Array1<f32>,
        old_values: Array1<f32>,
        returns: Array1<f32>,
        advantages: Array1<f32>,
    ) -> Result<LossStats>
    where
        M: ActorCriticModel + ?Sized,
    {
        let m = chunk.len() as f32;
        let actions: Vec<usize> = chunk.iter().map(|&i| batch.actions[i]).collect();
        let observations = batch.observations.select(Axis(0), chunk);

        let output = model.forward(observations.view())?;
        let dist = CategoricalBatch::from_logits(output.logits.view())?;
        let log_probs = dist.log_probs(&actions)?;
        let ratios = (&log_probs - &old_log_probs).mapv(f32::exp);

        let mut objectives = Array1::<f32>::zeros(chunk.len());
        let mut objective_grads = Array1::<f32>::zeros(chunk.len());
        Zip::from(&mut objectives)
            .and(&mut objective_grads)
            .and(&ratios)
            .and(&advantages)
            .for_each(|obj, grad, &ratio, &adv| {
                *obj = clipped_surrogate(ratio, adv, self.eps_clip, self.dual_clip);
                *grad = surrogate_grad(ratio, adv, self.eps_clip, self.dual_clip);
            });
        let policy_loss = -objectives.sum() / m;

        let (value_loss, value_grads) = self.value_loss(&output.values, &old_values, &returns, m);
        let entropy = dist.entropies().sum() / m;
        let total_loss = policy_loss + self.vf_coef * value_loss - self.ent_coef * entropy;

        let weights = objective_grads.mapv(|g| -g / m);
        let mut logit_grads = dist.log_prob_grad(&actions)? * &weights.insert_axis(Axis(1));
        logit_grads.scaled_add(-self.ent_coef / m, &dist.entropy_grad());
        let value_grads = value_grads * self.vf_coef;

        let grad_norm = gradient_step(
            model,
            total_loss,
            logit_grads.view(),
            value_grads.view(),
            self.max_grad_norm,
            self.learning_rate,
        )?;

        let approx_kl = (&old_log_probs - &log_probs).sum() / m;
        let clipped = ratios.iter().filter(|&&r| (r - 1.0).abs() > self.eps_clip).count();

        Ok(LossStats {
            policy_loss,
            value_loss,
            entropy,
            total_loss,
            grad_norm,
            approx_kl,
            clip_fraction: clipped as f32 / m,
            gradient_steps: 1,
        })
    }

    /// Value loss over a minibatch of size `m` and its gradient w.r.t. the values
    fn value_loss(&self, values: &Array1<f32>, old_values: &Array1<f32>, returns: &Array1<f32>, m: f32) -> (f32, Array1<f32>) {
        let mut losses = Array1::<f32>::zeros(values.len());
        let mut grads = Array1::<f32>::zeros(values.len());
        let eps = self.eps_clip;
        let value_clip = self.value_clip;

        Zip::from(&mut losses)
            .and(&mut grads)
            .and(values)
            .and(old_values)
            .and(returns)
            .for_each(|loss, grad, &v, &v_old, &ret| {
                let unclipped = (v - ret).powi(2);
                if !value_clip {
                    *loss = unclipped;
                    *grad = 2.0 * (v - ret) / m;
                    return;
                }
                let delta = v - v_old;
                let v_clipped = v_old + delta.clamp(-eps, eps);
                let clipped = (v_clipped - ret).powi(2);
                if unclipped >= clipped {
                    *loss = unclipped;
                    *grad = 2.0 * (v - ret) / m;
                } else {
                    *loss = clipped;
                    *grad = if delta.abs() < eps { 2.0 * (v_clipped - ret) / m } else { 0.0 };
                }
            });

        (losses.sum() / m, grads)
    }
}
