use std::collections::VecDeque;

use rand::seq::index::sample;
use rand::Rng;

use super::{Transition, TrajectoryBatch};
use crate::error::{OnPolicyError, Result};

/// Fixed-capacity circular store of transitions.
///
/// Adding to a full buffer silently evicts the oldest transition.
#[derive(Clone, Debug)]
pub struct ExperienceBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ExperienceBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(OnPolicyError::invalid_parameter("buffer_size", "capacity must be positive"));
        }
        Ok(ExperienceBuffer {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    pub fn add(&mut self, transition: Transition) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    pub fn extend<I: IntoIterator<Item = Transition>>(&mut self, transitions: I) {
        for transition in transitions {
            self.add(transition);
        }
    }

    /// Every stored transition, oldest first
    pub fn sample_all(&self) -> Result<TrajectoryBatch> {
        if self.buffer.is_empty() {
            return Err(OnPolicyError::EmptyBuffer("no transitions collected".to_string()));
        }
        TrajectoryBatch::from_transitions(self.buffer.iter())
    }

    /// `batch_size` distinct transitions drawn uniformly, kept in buffer order.
    /// Asking for more than is stored returns everything.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<TrajectoryBatch> {
        if self.buffer.is_empty() {
            return Err(OnPolicyError::EmptyBuffer("no transitions collected".to_string()));
        }
        if batch_size == 0 {
            return Err(OnPolicyError::invalid_parameter("batch_size", "must be positive"));
        }
        let amount = batch_size.min(self.buffer.len());
        let mut indices = sample(rng, self.buffer.len(), amount).into_vec();
        indices.sort_unstable();
        TrajectoryBatch::from_transitions(indices.into_iter().map(|i| &self.buffer[i]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
