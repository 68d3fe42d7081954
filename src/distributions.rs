//! Categorical action distribution over actor logits.
//!
//! Besides sampling and evaluation, the batch form exposes the analytic
//! derivatives of `log π(a|s)` and of the entropy with respect to the logits,
//! which the update rules chain into the actor's backward pass.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use crate::error::{OnPolicyError, Result};

/// Numerically stable log-softmax of one logit vector
fn log_softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let shifted = logits.mapv(|x| x - max_logit);
    let log_sum_exp = shifted.mapv(f32::exp).sum().ln();
    shifted.mapv(|x| x - log_sum_exp)
}

/// A categorical distribution built from unnormalized logits
#[derive(Clone, Debug)]
pub struct Categorical {
    log_probs: Array1<f32>,
    probs: Array1<f32>,
}

impl Categorical {
    pub fn from_logits(logits: ArrayView1<f32>) -> Result<Self> {
        if logits.is_empty() {
            return Err(OnPolicyError::invalid_parameter("logits", "need at least one action"));
        }
        if logits.iter().any(|l| !l.is_finite()) {
            return Err(OnPolicyError::NumericalError(format!("non-finite logits {:?}", logits)));
        }
        let log_probs = log_softmax(logits);
        let probs = log_probs.mapv(f32::exp);
        Ok(Categorical { log_probs, probs })
    }

    pub fn num_actions(&self) -> usize {
        self.probs.len()
    }

    pub fn probs(&self) -> &Array1<f32> {
        &self.probs
    }

    pub fn log_prob(&self, action: usize) -> Result<f32> {
        self.log_probs.get(action).copied().ok_or(OnPolicyError::InvalidAction {
            action,
            max_actions: self.num_actions(),
        })
    }

    pub fn entropy(&self) -> f32 {
        -self.probs.iter().zip(self.log_probs.iter()).map(|(p, lp)| p * lp).sum::<f32>()
    }

    /// Draw an action by inverse-CDF sampling
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let rand_val: f32 = rng.gen();
        let mut cumsum = 0.0;

        for (i, &p) in self.probs.iter().enumerate() {
            cumsum += p;
            if rand_val < cumsum {
                return i;
            }
        }

        // rounding left the cumulative sum just under 1
        self.probs.len() - 1
    }
}

/// Row-wise categorical distributions for a batch of logits
#[derive(Clone, Debug)]
pub struct CategoricalBatch {
    log_probs: Array2<f32>,
    probs: Array2<f32>,
}

impl CategoricalBatch {
    pub fn from_logits(logits: ArrayView2<f32>) -> Result<Self> {
        if logits.iter().any(|l| !l.is_finite()) {
            return Err(OnPolicyError::NumericalError("non-finite logits in batch".to_string()));
        }
        let mut log_probs = Array2::zeros(logits.dim());
        for (mut out, row) in log_probs.axis_iter_mut(Axis(0)).zip(logits.axis_iter(Axis(0))) {
            out.assign(&log_softmax(row));
        }
        let probs = log_probs.mapv(f32::exp);
        Ok(CategoricalBatch { log_probs, probs })
    }

    pub fn len(&self) -> usize {
        self.probs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.nrows() == 0
    }

    pub fn probs(&self) -> &Array2<f32> {
        &self.probs
    }

    fn check_actions(&self, actions: &[usize]) -> Result<()> {
        if actions.len() != self.len() {
            return Err(OnPolicyError::dimension_mismatch(
                format!("{} actions", self.len()),
                format!("{} actions", actions.len()),
            ));
        }
        let max_actions = self.probs.ncols();
        match actions.iter().find(|&&a| a >= max_actions) {
            Some(&action) => Err(OnPolicyError::InvalidAction { action, max_actions }),
            None => Ok(()),
        }
    }

    /// Sample one action per row
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        self.probs
            .axis_iter(Axis(0))
            .map(|row| {
                let rand_val: f32 = rng.gen();
                let mut cumsum = 0.0;
                for (i, &p) in row.iter().enumerate() {
                    cumsum += p;
                    if rand_val < cumsum {
                        return i;
                    }
                }
                row.len() - 1
            })
            .collect()
    }

    /// `log π(a_i | s_i)` for each row
    pub fn log_probs(&self, actions: &[usize]) -> Result<Array1<f32>> {
        self.check_actions(actions)?;
        Ok(Array1::from_iter(actions.iter().enumerate().map(|(i, &a)| self.log_probs[[i, a]])))
    }

    /// Entropy of each row
    pub fn entropies(&self) -> Array1<f32> {
        (&self.probs * &self.log_probs).sum_axis(Axis(1)).mapv(|x| -x)
    }

    /// d log π(a_i|s_i) / d logits = onehot(a_i) - p_i
    pub fn log_prob_grad(&self, actions: &[usize]) -> Result<Array2<f32>> {
        self.check_actions(actions)?;
        let mut grad = -&self.probs;
        for (i, &a) in actions.iter().enumerate() {
            grad[[i, a]] += 1.0;
        }
        Ok(grad)
    }

    /// dH_i / d logits_ij = -p_ij (log p_ij + H_i)
    pub fn entropy_grad(&self) -> Array2<f32> {
        let entropies = self.entropies();
        let mut grad = &self.log_probs + &entropies.insert_axis(Axis(1));
        grad.zip_mut_with(&self.probs, |g, &p| *g *= -p);
        grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_probs_sum_to_one() {
        let dist = Categorical::from_logits(array![1.0, 2.0, 3.0].view()).unwrap();
        assert!((dist.probs().sum() - 1.0).abs() < 1e-6);
        assert!(dist.probs().iter().all(|&p| p > 0.0 && p <= 1.0));
        assert!(dist.probs()[2] > dist.probs()[1] && dist.probs()[1] > dist.probs()[0]);
    }

    #[test]
    fn test_uniform_entropy() {
        let dist = Categorical::from_logits(array![0.0, 0.0, 0.0, 0.0].view()).unwrap();
        assert!((dist.entropy() - 4.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_large_logits_are_stable() {
        let dist = Categorical::from_logits(array![1000.0, 0.0].view()).unwrap();
        assert!(dist.log_prob(0).unwrap().is_finite());
        assert!(dist.log_prob(1).unwrap().is_finite());
        assert!(dist.log_prob(2).is_err());
    }

    #[test]
    fn test_rejects_nan_logits() {
        assert!(Categorical::from_logits(array![f32::NAN, 0.0].view()).is_err());
    }

    #[test]
    fn test_sampling_frequencies() {
        let dist = Categorical::from_logits(array![0.0, (3.0f32).ln()].view()).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let n = 20_000;
        let ones = (0..n).filter(|_| dist.sample(&mut rng) == 1).count();
        let freq = ones as f32 / n as f32;
        assert!((freq - 0.75).abs() < 0.02, "frequency {}", freq);
    }

    #[test]
    fn test_batch_gradients_match_finite_difference() {
        let logits = array![[0.2, -0.4, 1.1]];
        let batch = CategoricalBatch::from_logits(logits.view()).unwrap();
        let lp_grad = batch.log_prob_grad(&[1]).unwrap();
        let ent_grad = batch.entropy_grad();

        let eps = 1e-3;
        for j in 0..3 {
            let mut plus = logits.clone();
            plus[[0, j]] += eps;
            let mut minus = logits.clone();
            minus[[0, j]] -= eps;
            let p = CategoricalBatch::from_logits(plus.view()).unwrap();
            let m = CategoricalBatch::from_logits(minus.view()).unwrap();

            let d_lp = (p.log_probs(&[1]).unwrap()[0] - m.log_probs(&[1]).unwrap()[0]) / (2.0 * eps);
            let d_ent = (p.entropies()[0] - m.entropies()[0]) / (2.0 * eps);
            assert!((d_lp - lp_grad[[0, j]]).abs() < 1e-2);
            assert!((d_ent - ent_grad[[0, j]]).abs() < 1e-2);
        }
    }
}
