//! # Data Module
//!
//! Everything between the environments and the update engine: single
//! [`Transition`]s, the circular [`ExperienceBuffer`] they are stored in, the
//! stacked [`TrajectoryBatch`] view the update rules consume, and the
//! [`Collector`] that drives a policy through a pool of environments.

pub mod buffer;
pub mod collector;

use ndarray::{Array1, Array2, Axis};
use serde::{Serialize, Deserialize};

use crate::error::{OnPolicyError, Result};

pub use buffer::ExperienceBuffer;
pub use collector::{CollectRequest, CollectStats, Collector};

/// One environment step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub observation: Array1<f32>,
    pub action: usize,
    pub reward: f32,
    pub done: bool,
    pub next_observation: Array1<f32>,
    /// The episode continues past this transition but the stored segment ends
    /// here; returns bootstrap from the value of `next_observation`.
    pub truncated: bool,
}

/// Transitions stacked into arrays, in buffer order
#[derive(Clone, Debug)]
pub struct TrajectoryBatch {
    pub observations: Array2<f32>,
    pub actions: Vec<usize>,
    pub rewards: Array1<f32>,
    pub dones: Vec<bool>,
    pub truncated: Vec<bool>,
    pub next_observations: Array2<f32>,
}

impl TrajectoryBatch {
    pub fn from_transitions<'a, I>(transitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Transition>,
    {
        let transitions: Vec<&Transition> = transitions.into_iter().collect();
        let first = transitions
            .first()
            .ok_or_else(|| OnPolicyError::EmptyBuffer("cannot build an empty batch".to_string()))?;
        let obs_size = first.observation.len();

        let n = transitions.len();
        let mut observations = Array2::zeros((n, obs_size));
        let mut next_observations = Array2::zeros((n, obs_size));
        for (i, t) in transitions.iter().enumerate() {
            if t.observation.len() != obs_size || t.next_observation.len() != obs_size {
                return Err(OnPolicyError::dimension_mismatch(
                    format!("observations of size {}", obs_size),
                    format!("{} / {}", t.observation.len(), t.next_observation.len()),
                ));
            }
            observations.row_mut(i).assign(&t.observation);
            next_observations.row_mut(i).assign(&t.next_observation);
        }

        Ok(TrajectoryBatch {
            observations,
            actions: transitions.iter().map(|t| t.action).collect(),
            rewards: transitions.iter().map(|t| t.reward).collect(),
            dones: transitions.iter().map(|t| t.done).collect(),
            truncated: transitions.iter().map(|t| t.truncated).collect(),
            next_observations,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn observation_size(&self) -> usize {
        self.observations.ncols()
    }

    /// Whether transition `i` closes a stored segment: the episode ended, the
    /// segment was cut, or it is the last transition of the batch.
    pub fn is_segment_end(&self, i: usize) -> bool {
        self.dones[i] || self.truncated[i] || i + 1 == self.len()
    }

    /// Rows `indices` of this batch, in the given order
    pub fn select(&self, indices: &[usize]) -> TrajectoryBatch {
        TrajectoryBatch {
            observations: self.observations.select(Axis(0), indices),
            actions: indices.iter().map(|&i| self.actions[i]).collect(),
            rewards: self.rewards.select(Axis(0), indices),
            dones: indices.iter().map(|&i| self.dones[i]).collect(),
            truncated: indices.iter().map(|&i| self.truncated[i]).collect(),
            next_observations: self.next_observations.select(Axis(0), indices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn transition(obs: f32, done: bool, truncated: bool) -> Transition {
        Transition {
            observation: array![obs, -obs],
            action: 1,
            reward: obs,
            done,
            next_observation: array![obs + 1.0, -obs - 1.0],
            truncated,
        }
    }

    #[test]
    fn test_stacking() {
        let ts = vec![transition(0.0, false, false), transition(1.0, true, false)];
        let batch = TrajectoryBatch::from_transitions(&ts).unwrap();
        assert_eq!(batch.observations, array![[0.0, -0.0], [1.0, -1.0]]);
        assert_eq!(batch.next_observations.row(1), array![2.0, -2.0]);
        assert_eq!(batch.rewards, array![0.0, 1.0]);
        assert_eq!(batch.dones, vec![false, true]);
    }

    #[test]
    fn test_segment_ends() {
        let ts = vec![
            transition(0.0, false, false),
            transition(1.0, true, false),
            transition(2.0, false, true),
            transition(3.0, false, false),
        ];
        let batch = TrajectoryBatch::from_transitions(&ts).unwrap();
        let ends: Vec<bool> = (0..4).map(|i| batch.is_segment_end(i)).collect();
        assert_eq!(ends, vec![false, true, true, true]);
    }

    #[test]
    fn test_rejects_ragged_observations() {
        let mut bad = transition(1.0, false, false);
        bad.observation = array![1.0];
        let ts = vec![transition(0.0, false, false), bad];
        assert!(TrajectoryBatch::from_transitions(&ts).is_err());
        assert!(TrajectoryBatch::from_transitions(Vec::<&Transition>::new()).is_err());
    }

    #[test]
    fn test_select() {
        let ts: Vec<_> = (0..4).map(|i| transition(i as f32, false, false)).collect();
        let batch = TrajectoryBatch::from_transitions(&ts).unwrap();
        let sub = batch.select(&[3, 1]);
        assert_eq!(sub.rewards, array![3.0, 1.0]);
        assert_eq!(sub.observations.row(0), array![3.0, -3.0]);
    }
}
