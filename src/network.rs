use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{OnPolicyError, Result};
use crate::layers::{DenseLayer, WeightInit};

/// Weight and bias gradients of one network, in layer order
#[derive(Clone, Debug, Default)]
pub struct NetworkGradients {
    pub weights: Vec<Array2<f32>>,
    pub biases: Vec<Array1<f32>>,
    /// dL/d input of the first layer
    pub input_error: Option<Array2<f32>>,
}

/// A feed-forward neural network made of dense layers.
///
/// The network is used in two ways: `predict_batch` is a pure function of the
/// parameters (the collector only ever reads the policy), while
/// `forward_batch`/`backward_batch` form the training pass.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NeuralNetwork {
    pub layers: Vec<DenseLayer>,
}

impl NeuralNetwork {
    /// Create a new neural network with the given layer sizes and activations.
    /// Hidden layers use `hidden_init`, the last layer uses `output_init`.
    pub fn new<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        activations: &[Activation],
        hidden_init: WeightInit,
        output_init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(OnPolicyError::invalid_parameter(
                "layer_sizes",
                "network needs at least an input and an output size",
            ));
        }
        if layer_sizes.len() - 1 != activations.len() {
            return Err(OnPolicyError::dimension_mismatch(
                format!("{} activations", layer_sizes.len() - 1),
                format!("{} activations", activations.len()),
            ));
        }
        if layer_sizes.iter().any(|&s| s == 0) {
            return Err(OnPolicyError::invalid_parameter("layer_sizes", "sizes must be positive"));
        }

        let last = activations.len() - 1;
        let layers = layer_sizes
            .windows(2)
            .zip(activations.iter())
            .enumerate()
            .map(|(i, (window, &activation))| {
                let init = if i == last { output_init } else { hidden_init };
                DenseLayer::new(window[0], window[1], activation, init, rng)
            })
            .collect();

        Ok(NeuralNetwork { layers })
    }

    /// ReLU hidden layers followed by a linear output layer
    pub fn mlp<R: Rng + ?Sized>(
        input_size: usize,
        hidden_sizes: &[usize],
        output_size: usize,
        output_init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        let mut sizes = vec![input_size];
        sizes.extend_from_slice(hidden_sizes);
        sizes.push(output_size);

        let activations = vec![Activation::Relu; hidden_sizes.len()]
            .into_iter()
            .chain(std::iter::once(Activation::Linear))
            .collect::<Vec<_>>();

        Self::new(&sizes, &activations, WeightInit::HeUniform, output_init, rng)
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size())
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.output_size())
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    fn check_input(&self, inputs: &ArrayView2<f32>) -> Result<()> {
        if inputs.ncols() != self.input_size() {
            return Err(OnPolicyError::dimension_mismatch(
                format!("{} input features", self.input_size()),
                format!("{} input features", inputs.ncols()),
            ));
        }
        Ok(())
    }

    /// Inference for a batch of inputs; does not touch the backprop cache.
    pub fn predict_batch(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(&inputs)?;
        let mut current = inputs.to_owned();
        for layer in &self.layers {
            current = layer.predict_batch(current.view());
        }
        Ok(current)
    }

    /// Training forward pass: caches activations for `backward_batch`.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(&inputs)?;
        let mut current = inputs.to_owned();
        for layer in &mut self.layers {
            current = layer.forward_batch(current.view());
        }
        Ok(current)
    }

    /// Backpropagate dL/d output through every layer.
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<NetworkGradients> {
        let mut weights = Vec::with_capacity(self.layers.len());
        let mut biases = Vec::with_capacity(self.layers.len());
        let mut current_error = output_errors.to_owned();

        for layer in self.layers.iter().rev() {
            let grads = layer.backward_batch(current_error.view())?;
            weights.push(grads.weights);
            biases.push(grads.biases);
            current_error = grads.input_error;
        }

        weights.reverse();
        biases.reverse();
        Ok(NetworkGradients {
            weights,
            biases,
            input_error: Some(current_error),
        })
    }
}
