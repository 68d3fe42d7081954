use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::advantage::{compute_targets, AdvantageEstimator};
use super::{gradient_step, LossStats};
use crate::data::TrajectoryBatch;
use crate::distributions::CategoricalBatch;
use crate::error::Result;
use crate::policy::ActorCriticModel;

/// Synchronous advantage actor-critic.
///
/// Loss = `-mean(log π(a|s) A) + vf_coef mean((V(s) - R)^2) - ent_coef mean(H)`,
/// with `A = R - V(s)` held constant. One gradient step per call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct A2c {
    pub learning_rate: f32,
    pub gamma: f32,
    pub vf_coef: f32,
    pub ent_coef: f32,
    pub max_grad_norm: Option<f32>,
    pub rew_norm: bool,
}

impl A2c {
    pub fn update<M>(&self, model: &mut M, batch: &TrajectoryBatch) -> Result<LossStats>
    where
        M: ActorCriticModel + ?Sized,
    {
        let next_values = model.predict(batch.next_observations.view())?.values;
        let output = model.forward(batch.observations.view())?;
        let targets = compute_targets(
            batch,
            output.values.view(),
            next_values.view(),
            self.gamma,
            AdvantageEstimator::MonteCarlo,
            self.rew_norm,
        )?;

        let n = batch.len() as f32;
        let dist = CategoricalBatch::from_logits(output.logits.view())?;
        let log_probs = dist.log_probs(&batch.actions)?;
        let entropies = dist.entropies();

        let policy_loss = -(&log_probs * &targets.advantages).sum() / n;
        let value_errors = &output.values - &targets.returns;
        let value_loss = value_errors.mapv(|e| e * e).sum() / n;
        let entropy = entropies.sum() / n;
        let total_loss = policy_loss + self.vf_coef * value_loss - self.ent_coef * entropy;

        // d loss / d logits
        let weights: Array1<f32> = targets.advantages.mapv(|a| -a / n);
        let mut logit_grads = dist.log_prob_grad(&batch.actions)? * &weights.insert_axis(Axis(1));
        logit_grads.scaled_add(-self.ent_coef / n, &dist.entropy_grad());
        // d loss / d values
        let value_grads = value_errors.mapv(|e| self.vf_coef * 2.0 * e / n);

        let grad_norm = gradient_step(
            model,
            total_loss,
            logit_grads.view(),
            value_grads.view(),
            self.max_grad_norm,
            self.learning_rate,
        )?;

        debug!(policy_loss, value_loss, entropy, grad_norm, "a2c update");

        Ok(LossStats {
            policy_loss,
            value_loss,
            entropy,
            total_loss,
            grad_norm,
            approx_kl: 0.0,
            clip_fraction: 0.0,
            gradient_steps: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Transition;
    use crate::optimizer::{OptimizerWrapper, SGD};
    use crate::policy::ActorCriticBuilder;
    use ndarray::array;

    fn rule() -> A2c {
        A2c {
            learning_rate: 0.1,
            gamma: 0.9,
            vf_coef: 0.5,
            ent_coef: 0.0,
            max_grad_norm: None,
            rew_norm: false,
        }
    }

    /// One-step episodes where action 0 pays 1 and action 1 pays -1
    fn bandit_batch() -> TrajectoryBatch {
        let transitions: Vec<Transition> = (0..8)
            .map(|i| Transition {
                observation: array![1.0, 0.0],
                action: i % 2,
                reward: if i % 2 == 0 { 1.0 } else { -1.0 },
                done: true,
                next_observation: array![0.0, 0.0],
                truncated: false,
            })
            .collect();
        TrajectoryBatch::from_transitions(&transitions).unwrap()
    }

    #[test]
    fn test_update_prefers_rewarded_action() {
        let mut model = ActorCriticBuilder::new(2, 2)
            .hidden_sizes(vec![8])
            .optimizer(OptimizerWrapper::SGD(SGD::new()))
            .seed(4)
            .build()
            .unwrap();
        let batch = bandit_batch();
        let obs = array![[1.0, 0.0]];
        let before = model.distribution(obs.view()).unwrap().probs()[[0, 0]];

        for _ in 0..20 {
            let stats = rule().update(&mut model, &batch).unwrap();
            assert_eq!(stats.gradient_steps, 1);
            assert!(stats.total_loss.is_finite());
        }

        let after = model.distribution(obs.view()).unwrap().probs()[[0, 0]];
        assert!(after > before);
    }

    #[test]
    fn test_non_finite_loss_is_rejected_before_step() {
        let mut model = ActorCriticBuilder::new(2, 2).hidden_sizes(vec![4]).build().unwrap();
        let mut batch = bandit_batch();
        batch.rewards[0] = f32::NAN;

        let snapshot = model.clone();
        let err = rule().update(&mut model, &batch).unwrap_err();
        assert!(matches!(err, crate::error::OnPolicyError::NumericalError(_)));

        let obs = array![[1.0, 0.0]];
        assert_eq!(
            model.predict(obs.view()).unwrap().logits,
            snapshot.predict(obs.view()).unwrap().logits
        );
    }
}
