use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{OnPolicyError, Result};
use super::initialization::WeightInit;

/// Gradients produced by one backward pass through a dense layer
#[derive(Clone, Debug)]
pub struct DenseGradients {
    /// Error with respect to the layer inputs, to be passed to the previous layer
    pub input_error: Array2<f32>,
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

/// A fully connected (dense) layer in a neural network
///
/// `forward_batch` caches its inputs and pre-activations so that a following
/// `backward_batch` can compute gradients. `predict_batch` is the read-only
/// inference path and leaves the cache untouched.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

impl DenseLayer {
    /// Create a new dense layer with the given input size, output size, activation function
    /// and weight initialization. Biases are initialized with zeros.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Self {
        DenseLayer {
            weights: init.initialize_weights((input_size, output_size), rng),
            biases: init.initialize_biases(output_size),
            activation,
            pre_activation_output: None,
            inputs: None,
        }
    }

    pub fn with_weights(mut self, weights: Array2<f32>) -> Result<Self> {
        if weights.dim() != self.weights.dim() {
            return Err(OnPolicyError::dimension_mismatch(
                format!("{:?}", self.weights.dim()),
                format!("{:?}", weights.dim()),
            ));
        }
        self.weights = weights;
        Ok(self)
    }

    pub fn with_biases(mut self, biases: Array1<f32>) -> Result<Self> {
        if biases.dim() != self.biases.dim() {
            return Err(OnPolicyError::dimension_mismatch(
                format!("{}", self.biases.len()),
                format!("{}", biases.len()),
            ));
        }
        self.biases = biases;
        Ok(self)
    }

    fn affine(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0))
    }

    /// Inference without caching
    pub fn predict_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut outputs = self.affine(inputs);
        self.activation.apply_batch(&mut outputs);
        outputs
    }

    /// Forward pass that remembers what `backward_batch` needs
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut outputs = self.affine(inputs);
        self.inputs = Some(inputs.to_owned());
        self.pre_activation_output = Some(outputs.clone());
        self.activation.apply_batch(&mut outputs);
        outputs
    }

    /// Backpropagate `output_errors` (dL/d output, one row per sample).
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<DenseGradients> {
        let (pre_activation_output, inputs) = match (&self.pre_activation_output, &self.inputs) {
            (Some(pre), Some(inputs)) => (pre, inputs),
            _ => {
                return Err(OnPolicyError::TrainingError(
                    "forward_batch() must be called before backward_batch()".to_string(),
                ))
            }
        };
        if output_errors.dim() != pre_activation_output.dim() {
            return Err(OnPolicyError::dimension_mismatch(
                format!("{:?}", pre_activation_output.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let activation_deriv = self.activation.derivative_batch(pre_activation_output.view());
        let adjusted_error = &output_errors * &activation_deriv;
        let weights = inputs.t().dot(&adjusted_error);
        let biases = adjusted_error.sum_axis(Axis(0));
        let input_error = adjusted_error.dot(&self.weights.t());

        Ok(DenseGradients { input_error, weights, biases })
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

/// Short alias used throughout the crate
pub type Layer = DenseLayer;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn linear_layer() -> DenseLayer {
        let mut rng = StdRng::seed_from_u64(0);
        DenseLayer::new(2, 1, Activation::Linear, WeightInit::Zeros, &mut rng)
            .with_weights(array![[2.0], [-1.0]])
            .unwrap()
            .with_biases(array![0.5])
            .unwrap()
    }

    #[test]
    fn test_predict_matches_forward() {
        let mut layer = linear_layer();
        let x = array![[1.0, 1.0], [2.0, 0.0]];
        let a = layer.predict_batch(x.view());
        let b = layer.forward_batch(x.view());
        assert_eq!(a, b);
        assert_eq!(a, array![[1.5], [4.5]]);
    }

    #[test]
    fn test_backward_requires_forward() {
        let layer = linear_layer();
        let err = array![[1.0]];
        assert!(layer.backward_batch(err.view()).is_err());
    }

    #[test]
    fn test_backward_gradients() {
        let mut layer = linear_layer();
        let x = array![[1.0, 3.0]];
        layer.forward_batch(x.view());
        let grads = layer.backward_batch(array![[1.0]].view()).unwrap();
        assert_eq!(grads.weights, array![[1.0], [3.0]]);
        assert_eq!(grads.biases, array![1.0]);
        assert_eq!(grads.input_error, array![[2.0, -1.0]]);
    }

    #[test]
    fn test_with_weights_rejects_wrong_shape() {
        let layer = linear_layer();
        assert!(layer.with_weights(array![[1.0, 2.0]]).is_err());
    }
}
