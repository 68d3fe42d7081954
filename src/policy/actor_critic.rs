use std::path::Path;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{OnPolicyError, Result};
use crate::layers::WeightInit;
use crate::network::NeuralNetwork;
use crate::optimizer::{Optimizer, OptimizerWrapper};
use super::{ActorCriticModel, ParameterGradients, PolicyOutput};

/// MLP actor-critic.
///
/// With a trunk, observations go through the shared ReLU feature layers and the
/// actor/critic are single linear heads on top of the features; gradients from
/// both heads are summed into the trunk. Without a trunk the actor and critic
/// are independent MLPs.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ActorCritic {
    pub trunk: Option<NeuralNetwork>,
    pub actor: NeuralNetwork,
    pub critic: NeuralNetwork,
    pub optimizer: OptimizerWrapper,
}

impl ActorCritic {
    fn features(&self, observations: ArrayView2<f32>) -> Result<Array2<f32>> {
        match &self.trunk {
            Some(trunk) => trunk.predict_batch(observations),
            None => Ok(observations.to_owned()),
        }
    }

    fn layer_count(&self) -> usize {
        self.trunk.as_ref().map_or(0, |t| t.layers.len()) + self.actor.layers.len() + self.critic.layers.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.trunk.as_ref().map_or(0, |t| t.parameter_count())
            + self.actor.parameter_count()
            + self.critic.parameter_count()
    }

    /// Serialize the full model (parameters and optimizer state) with bincode
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = bincode::serialize(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Load a model written by [`ActorCritic::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        let model = bincode::deserialize(&data)?;
        Ok(model)
    }
}

impl ActorCriticModel for ActorCritic {
    fn observation_size(&self) -> usize {
        match &self.trunk {
            Some(trunk) => trunk.input_size(),
            None => self.actor.input_size(),
        }
    }

    fn num_actions(&self) -> usize {
        self.actor.output_size()
    }

    fn predict(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        let features = self.features(observations)?;
        let logits = self.actor.predict_batch(features.view())?;
        let values = self.critic.predict_batch(features.view())?.index_axis_move(Axis(1), 0);
        Ok(PolicyOutput { logits, values })
    }

    fn forward(&mut self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        let features = match &mut self.trunk {
            Some(trunk) => trunk.forward_batch(observations)?,
            None => observations.to_owned(),
        };
        let logits = self.actor.forward_batch(features.view())?;
        let values = self.critic.forward_batch(features.view())?.index_axis_move(Axis(1), 0);
        Ok(PolicyOutput { logits, values })
    }

    fn backward(&mut self, logit_grads: ArrayView2<f32>, value_grads: ArrayView1<f32>) -> Result<ParameterGradients> {
        let actor_grads = self.actor.backward_batch(logit_grads)?;
        let value_grads = value_grads.insert_axis(Axis(1));
        let critic_grads = self.critic.backward_batch(value_grads)?;

        let mut gradients = ParameterGradients::default();
        if let Some(trunk) = &self.trunk {
            let feature_error = match (&actor_grads.input_error, &critic_grads.input_error) {
                (Some(a), Some(c)) => a + c,
                _ => {
                    return Err(OnPolicyError::TrainingError(
                        "heads did not report an input error".to_string(),
                    ))
                }
            };
            let trunk_grads = trunk.backward_batch(feature_error.view())?;
            gradients.weights.extend(trunk_grads.weights);
            gradients.biases.extend(trunk_grads.biases);
        }
        gradients.weights.extend(actor_grads.weights);
        gradients.biases.extend(actor_grads.biases);
        gradients.weights.extend(critic_grads.weights);
        gradients.biases.extend(critic_grads.biases);
        Ok(gradients)
    }

    fn apply_gradients(&mut self, gradients: &ParameterGradients, learning_rate: f32) -> Result<()> {
        let expected = self.layer_count();
        if gradients.weights.len() != expected || gradients.biases.len() != expected {
            return Err(OnPolicyError::dimension_mismatch(
                format!("{} gradient tensors", expected),
                format!("{}/{} gradient tensors", gradients.weights.len(), gradients.biases.len()),
            ));
        }

        let optimizer = &mut self.optimizer;
        optimizer.begin_step();

        let layers = self
            .trunk
            .iter_mut()
            .flat_map(|t| t.layers.iter_mut())
            .chain(self.actor.layers.iter_mut())
            .chain(self.critic.layers.iter_mut());

        for (slot, (layer, (weight_grad, bias_grad))) in layers
            .zip(gradients.weights.iter().zip(gradients.biases.iter()))
            .enumerate()
        {
            if weight_grad.dim() != layer.weights.dim() {
                return Err(OnPolicyError::dimension_mismatch(
                    format!("{:?}", layer.weights.dim()),
                    format!("{:?}", weight_grad.dim()),
                ));
            }
            optimizer.update_weights(slot, &mut layer.weights, weight_grad, learning_rate);
            optimizer.update_biases(slot, &mut layer.biases, bias_grad, learning_rate);
        }
        Ok(())
    }
}

/// Builder pattern for [`ActorCritic`]
pub struct ActorCriticBuilder {
    observation_size: usize,
    num_actions: usize,
    hidden_sizes: Vec<usize>,
    shared_trunk: bool,
    optimizer: Option<OptimizerWrapper>,
    seed: u64,
}

impl ActorCriticBuilder {
    pub fn new(observation_size: usize, num_actions: usize) -> Self {
        ActorCriticBuilder {
            observation_size,
            num_actions,
            hidden_sizes: vec![128, 128],
            shared_trunk: true,
            optimizer: None,
            seed: 0,
        }
    }

    pub fn hidden_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.hidden_sizes = sizes;
        self
    }

    pub fn shared_trunk(mut self, shared: bool) -> Self {
        self.shared_trunk = shared;
        self
    }

    pub fn optimizer(mut self, optimizer: OptimizerWrapper) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> Result<ActorCritic> {
        if self.observation_size == 0 || self.num_actions == 0 {
            return Err(OnPolicyError::invalid_parameter(
                "shape",
                "observation size and action count must be positive",
            ));
        }
        if self.shared_trunk && self.hidden_sizes.is_empty() {
            return Err(OnPolicyError::invalid_parameter(
                "hidden_sizes",
                "a shared trunk needs at least one hidden layer",
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        // small output weights keep the initial policy close to uniform
        let actor_init = WeightInit::Uniform { min: -0.01, max: 0.01 };
        let critic_init = WeightInit::XavierUniform;

        let (trunk, actor, critic) = if self.shared_trunk {
            let mut sizes = vec![self.observation_size];
            sizes.extend_from_slice(&self.hidden_sizes);
            let activations = vec![Activation::Relu; self.hidden_sizes.len()];
            let trunk = NeuralNetwork::new(
                &sizes,
                &activations,
                WeightInit::HeUniform,
                WeightInit::HeUniform,
                &mut rng,
            )?;
            let feature_size = trunk.output_size();
            let actor = NeuralNetwork::mlp(feature_size, &[], self.num_actions, actor_init, &mut rng)?;
            let critic = NeuralNetwork::mlp(feature_size, &[], 1, critic_init, &mut rng)?;
            (Some(trunk), actor, critic)
        } else {
            let actor = NeuralNetwork::mlp(
                self.observation_size,
                &self.hidden_sizes,
                self.num_actions,
                actor_init,
                &mut rng,
            )?;
            let critic = NeuralNetwork::mlp(self.observation_size, &self.hidden_sizes, 1, critic_init, &mut rng)?;
            (None, actor, critic)
        };

        Ok(ActorCritic {
            trunk,
            actor,
            critic,
            optimizer: self.optimizer.unwrap_or_default(),
        })
    }
}
