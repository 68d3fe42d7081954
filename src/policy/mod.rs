//! # Policy Module
//!
//! The policy is the pair (actor, critic): the actor maps a batch of
//! observations to categorical logits, the critic maps them to scalar state
//! values. Everything upstream of this module (collector, update rules,
//! trainer) only talks to the [`ActorCriticModel`] trait, so any network
//! architecture can be plugged in. [`ActorCritic`] is the bundled MLP
//! implementation, with an optional feature trunk shared by both heads.

pub mod actor_critic;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::distributions::CategoricalBatch;
use crate::error::Result;

pub use actor_critic::{ActorCritic, ActorCriticBuilder};

/// Actor logits and critic values for a batch of observations
#[derive(Clone, Debug)]
pub struct PolicyOutput {
    pub logits: Array2<f32>,
    pub values: Array1<f32>,
}

/// Gradients of every trainable tensor of a model, in a fixed order
#[derive(Clone, Debug, Default)]
pub struct ParameterGradients {
    pub weights: Vec<Array2<f32>>,
    pub biases: Vec<Array1<f32>>,
}

impl ParameterGradients {
    pub fn is_finite(&self) -> bool {
        self.weights.iter().all(|g| g.iter().all(|x| x.is_finite()))
            && self.biases.iter().all(|g| g.iter().all(|x| x.is_finite()))
    }
}

/// The policy interface consumed by the collector and the update rules.
pub trait ActorCriticModel {
    fn observation_size(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Read-only evaluation; used while collecting so parameters stay fixed
    /// for the whole phase.
    fn predict(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput>;

    /// Training forward pass; caches what `backward` needs.
    fn forward(&mut self, observations: ArrayView2<f32>) -> Result<PolicyOutput>;

    /// Backpropagate dL/d logits and dL/d values of the last `forward`.
    fn backward(&mut self, logit_grads: ArrayView2<f32>, value_grads: ArrayView1<f32>) -> Result<ParameterGradients>;

    /// One optimizer step with the given gradients.
    fn apply_gradients(&mut self, gradients: &ParameterGradients, learning_rate: f32) -> Result<()>;

    /// Action distribution for a batch of observations
    fn distribution(&self, observations: ArrayView2<f32>) -> Result<CategoricalBatch> {
        let output = self.predict(observations)?;
        CategoricalBatch::from_logits(output.logits.view())
    }
}
