use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Serialize, Deserialize};

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization
    XavierUniform,

    /// He/Kaiming uniform initialization (for ReLU)
    HeUniform,

    /// Uniform distribution with custom range
    Uniform { min: f32, max: f32 },

    /// All zeros
    Zeros,
}

impl WeightInit {
    /// Initialize a `(fan_in, fan_out)` weight matrix from the given generator
    pub fn initialize_weights<R: Rng + ?Sized>(&self, shape: (usize, usize), rng: &mut R) -> Array2<f32> {
        let (fan_in, fan_out) = shape;

        match self {
            WeightInit::XavierUniform => {
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                Array2::random_using(shape, Uniform::new_inclusive(-limit, limit), rng)
            }

            WeightInit::HeUniform => {
                let limit = (6.0 / fan_in.max(1) as f32).sqrt();
                Array2::random_using(shape, Uniform::new_inclusive(-limit, limit), rng)
            }

            WeightInit::Uniform { min, max } => {
                Array2::random_using(shape, Uniform::new_inclusive(*min, *max), rng)
            }

            WeightInit::Zeros => Array2::zeros(shape),
        }
    }

    /// Biases always start at zero
    pub fn initialize_biases(&self, size: usize) -> Array1<f32> {
        Array1::zeros(size)
    }
}
