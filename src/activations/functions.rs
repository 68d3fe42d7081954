use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};

/// An enumeration of the possible activation functions that can be used in a neural network layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq)]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Tanh,
    LeakyRelu { alpha: f32 },
}

impl Activation {
    /// Apply the activation function to a batch of pre-activations in-place.
    pub fn apply_batch(&self, inputs: &mut Array2<f32>) {
        match self {
            Activation::Relu => {
                inputs.mapv_inplace(|v| v.max(0.0));
            }
            Activation::Linear => {}
            Activation::Tanh => {
                inputs.mapv_inplace(|v| v.tanh());
            }
            Activation::LeakyRelu { alpha } => {
                let a = *alpha;
                inputs.mapv_inplace(|v| if v > 0.0 { v } else { a * v });
            }
        }
    }

    /// Compute the derivative of the activation function for a batch of pre-activations.
    pub fn derivative_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => {
                inputs.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
            }
            Activation::Linear => {
                Array2::ones(inputs.dim())
            }
            Activation::Tanh => {
                inputs.mapv(|v| {
                    let tanh_v = v.tanh();
                    1.0 - tanh_v * tanh_v
                })
            }
            Activation::LeakyRelu { alpha } => {
                let a = *alpha;
                inputs.mapv(|v| if v > 0.0 { 1.0 } else { a })
            }
        }
    }
}
