//! Return and advantage estimation shared by both update rules.
//!
//! All estimators walk the batch backwards and restart at segment ends. A
//! segment end that is not a true episode end (`done == false`) bootstraps
//! from the critic's value of the next observation.

use ndarray::{Array1, ArrayView1};
use serde::{Serialize, Deserialize};

use crate::data::TrajectoryBatch;
use crate::error::{OnPolicyError, Result};
use crate::metrics::Statistics;

/// Below this standard deviation normalization is skipped
const NORM_EPS: f32 = 1e-8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AdvantageEstimator {
    /// `A_t = R_t - V(s_t)`
    MonteCarlo,
    /// Generalized advantage estimation
    Gae { lambda: f32 },
}

/// Per-transition targets derived for one update call
#[derive(Clone, Debug)]
pub struct Targets {
    pub returns: Array1<f32>,
    pub advantages: Array1<f32>,
}

fn check_lengths(n: usize, lens: &[(&str, usize)]) -> Result<()> {
    match lens.iter().find(|(_, len)| *len != n) {
        Some((name, len)) => Err(OnPolicyError::dimension_mismatch(
            format!("{} entries", n),
            format!("{} {}", len, name),
        )),
        None => Ok(()),
    }
}

/// Value of the successor state of transition `i`
fn next_value(i: usize, dones: &[bool], ends: &[bool], values: ArrayView1<f32>, next_values: ArrayView1<f32>) -> f32 {
    if dones[i] {
        0.0
    } else if ends[i] {
        next_values[i]
    } else {
        values[i + 1]
    }
}

/// `R_t = r_t + γ R_{t+1} (1 - done_t)`, bootstrapped with `next_values` at
/// segment ends that are not episode ends.
pub fn discounted_returns(
    rewards: ArrayView1<f32>,
    dones: &[bool],
    ends: &[bool],
    next_values: ArrayView1<f32>,
    gamma: f32,
) -> Result<Array1<f32>> {
    let n = rewards.len();
    check_lengths(n, &[("dones", dones.len()), ("segment ends", ends.len()), ("next values", next_values.len())])?;

    let mut returns = Array1::zeros(n);
    let mut running = 0.0;
    for i in (0..n).rev() {
        let successor = if dones[i] {
            0.0
        } else if ends[i] {
            next_values[i]
        } else {
            running
        };
        running = rewards[i] + gamma * successor;
        returns[i] = running;
    }
    Ok(returns)
}

/// `A_t = Σ_k (γλ)^k δ_{t+k}` with `δ_t = r_t + γ V(s_{t+1}) (1 - done_t) - V(s_t)`,
/// summed within a segment.
pub fn gae(
    rewards: ArrayView1<f32>,
    values: ArrayView1<f32>,
    next_values: ArrayView1<f32>,
    dones: &[bool],
    ends: &[bool],
    gamma: f32,
    lambda: f32,
) -> Result<Array1<f32>> {
    let n = rewards.len();
    check_lengths(
        n,
        &[
            ("values", values.len()),
            ("next values", next_values.len()),
            ("dones", dones.len()),
            ("segment ends", ends.len()),
        ],
    )?;

    let mut advantages = Array1::zeros(n);
    let mut running = 0.0;
    for i in (0..n).rev() {
        if ends[i] {
            running = 0.0;
        }
        let delta = rewards[i] + gamma * next_value(i, dones, ends, values, next_values) - values[i];
        running = delta + gamma * lambda * running;
        advantages[i] = running;
    }
    Ok(advantages)
}

/// Shift to zero mean and scale to unit variance; a no-op for near-constant input
pub fn normalize(values: &mut Array1<f32>) {
    let stats = Statistics::from_array(values.view());
    if stats.count > 1 && stats.std > NORM_EPS {
        values.mapv_inplace(|x| (x - stats.mean) / stats.std);
    }
}

/// Returns and advantages of a whole batch.
///
/// `values` and `next_values` are the critic's estimates for the batch's
/// observations and next observations. With `normalize_rewards` the rewards
/// are standardized before estimation and the advantages after it.
pub fn compute_targets(
    batch: &TrajectoryBatch,
    values: ArrayView1<f32>,
    next_values: ArrayView1<f32>,
    gamma: f32,
    estimator: AdvantageEstimator,
    normalize_rewards: bool,
) -> Result<Targets> {
    let ends: Vec<bool> = (0..batch.len()).map(|i| batch.is_segment_end(i)).collect();
    let mut rewards = batch.rewards.clone();
    if normalize_rewards {
        normalize(&mut rewards);
    }

    let (returns, mut advantages) = match estimator {
        AdvantageEstimator::MonteCarlo => {
            let returns = discounted_returns(rewards.view(), &batch.dones, &ends, next_values, gamma)?;
            check_lengths(returns.len(), &[("values", values.len())])?;
            let advantages = &returns - &values;
            (returns, advantages)
        }
        AdvantageEstimator::Gae { lambda } => {
            let advantages = gae(rewards.view(), values, next_values, &batch.dones, &ends, gamma, lambda)?;
            let returns = &advantages + &values;
            (returns, advantages)
        }
    };

    if normalize_rewards {
        normalize(&mut advantages);
    }
    Ok(Targets { returns, advantages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_discounted_returns_single_episode() {
        let returns = discounted_returns(
            array![1.0, 1.0, 1.0].view(),
            &[false, false, true],
            &[false, false, true],
            array![0.0, 0.0, 0.0].view(),
            0.9,
        )
        .unwrap();
        let expected = [2.71, 1.9, 1.0];
        for (r, e) in returns.iter().zip(expected.iter()) {
            assert!((r - e).abs() < 1e-5);
        }
    }

    #[test]
    fn test_returns_restart_at_episode_end() {
        let returns = discounted_returns(
            array![1.0, 2.0, 3.0].view(),
            &[true, false, true],
            &[true, false, true],
            array![0.0, 0.0, 0.0].view(),
            0.5,
        )
        .unwrap();
        assert_eq!(returns, array![1.0, 3.5, 3.0]);
    }

    #[test]
    fn test_truncated_segment_bootstraps() {
        let returns = discounted_returns(
            array![1.0, 1.0].view(),
            &[false, false],
            &[false, true],
            array![0.0, 10.0].view(),
            0.5,
        )
        .unwrap();
        // R_1 = 1 + 0.5 * 10, R_0 = 1 + 0.5 * 6
        assert_eq!(returns, array![4.0, 6.0]);
    }

    #[test]
    fn test_gae_lambda_zero_is_td_error() {
        let values = array![0.5, 1.0, 2.0];
        let next_values = array![1.0, 2.0, 0.0];
        let adv = gae(
            array![1.0, 1.0, 1.0].view(),
            values.view(),
            next_values.view(),
            &[false, false, true],
            &[false, false, true],
            0.9,
            0.0,
        )
        .unwrap();
        assert!((adv[0] - (1.0 + 0.9 * 1.0 - 0.5)).abs() < 1e-6);
        assert!((adv[1] - (1.0 + 0.9 * 2.0 - 1.0)).abs() < 1e-6);
        assert!((adv[2] - (1.0 - 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let result = discounted_returns(array![1.0, 1.0].view(), &[false], &[true], array![0.0].view(), 0.9);
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize() {
        let mut x = array![1.0, 2.0, 3.0, 4.0];
        normalize(&mut x);
        assert!(x.sum().abs() < 1e-5);
        assert!((x.mapv(|v| v * v).mean().unwrap() - 1.0).abs() < 1e-4);

        let mut constant = array![3.0, 3.0];
        normalize(&mut constant);
        assert_eq!(constant, array![3.0, 3.0]);
    }

    #[test]
    fn test_targets_standardize_rewards_then_advantages() {
        use crate::data::Transition;

        let transitions: Vec<Transition> = [1.0, 2.0, 6.0]
            .iter()
            .enumerate()
            .map(|(i, &reward)| Transition {
                observation: array![i as f32],
                action: 0,
                reward,
                done: i == 2,
                next_observation: array![i as f32 + 1.0],
                truncated: false,
            })
            .collect();
        let batch = TrajectoryBatch::from_transitions(&transitions).unwrap();
        let values = array![0.5, -0.5, 0.25];
        let next_values = array![-0.5, 0.25, 0.0];
        let ends = [false, false, true];

        let raw = compute_targets(&batch, values.view(), next_values.view(), 0.9, AdvantageEstimator::MonteCarlo, false)
            .unwrap();
        let scaled = compute_targets(&batch, values.view(), next_values.view(), 0.9, AdvantageEstimator::MonteCarlo, true)
            .unwrap();

        // returns come from standardized rewards
        let mut rewards = batch.rewards.clone();
        normalize(&mut rewards);
        let expected = discounted_returns(rewards.view(), &batch.dones, &ends, next_values.view(), 0.9).unwrap();
        for (a, b) in scaled.returns.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5, "{} vs {}", a, b);
        }
        assert!((raw.returns[2] - 6.0).abs() < 1e-6);
        assert!((scaled.returns[2] - 6.0).abs() > 1.0);

        // advantages are standardized again after estimation
        assert!(scaled.advantages.sum().abs() < 1e-5);
        assert!((scaled.advantages.mapv(|v| v * v).mean().unwrap() - 1.0).abs() < 1e-4);
        let unscaled = &expected - &values;
        assert!((scaled.advantages[0] - unscaled[0]).abs() > 1e-3);

        let gae_targets = compute_targets(
            &batch,
            values.view(),
            next_values.view(),
            0.9,
            AdvantageEstimator::Gae { lambda: 0.95 },
            true,
        )
        .unwrap();
        assert!(gae_targets.advantages.sum().abs() < 1e-5);
        assert!(gae_targets.returns.iter().all(|r| r.is_finite()));
    }
}
