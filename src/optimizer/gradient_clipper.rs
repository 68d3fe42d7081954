use ndarray::{Array1, Array2};

/// Gradient clipping methods
#[derive(Clone, Debug, PartialEq)]
pub enum GradientClipper {
    /// Clip gradients by global norm (across all parameters)
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    None,
}

impl GradientClipper {
    /// Global-norm clipping when a bound is configured, otherwise no clipping
    pub fn from_max_norm(max_norm: Option<f32>) -> Self {
        match max_norm {
            Some(max_norm) => GradientClipper::ClipByGlobalNorm { max_norm },
            None => GradientClipper::None,
        }
    }

    /// Clip a full set of gradients in place and return the global norm measured
    /// before clipping.
    pub fn clip(&self, weight_grads: &mut [Array2<f32>], bias_grads: &mut [Array1<f32>]) -> f32 {
        let norm = Self::compute_global_norm(weight_grads, bias_grads);
        match self {
            GradientClipper::ClipByGlobalNorm { max_norm } => {
                Self::scale_to_norm(weight_grads, bias_grads, norm, *max_norm);
            }

            GradientClipper::None => {}
        }
        norm
    }

    /// Compute global norm of all gradients
    pub fn compute_global_norm(weight_grads: &[Array2<f32>], bias_grads: &[Array1<f32>]) -> f32 {
        let weight_norm_sq: f32 = weight_grads.iter()
            .map(|g| g.iter().map(|&x| x * x).sum::<f32>())
            .sum();

        let bias_norm_sq: f32 = bias_grads.iter()
            .map(|g| g.iter().map(|&x| x * x).sum::<f32>())
            .sum();

        (weight_norm_sq + bias_norm_sq).sqrt()
    }

    fn scale_to_norm(
        weight_grads: &mut [Array2<f32>],
        bias_grads: &mut [Array1<f32>],
        global_norm: f32,
        max_norm: f32,
    ) {
        if global_norm > max_norm {
            let scale = max_norm / (global_norm + 1e-6);

            for grad in weight_grads.iter_mut() {
                grad.mapv_inplace(|g| g * scale);
            }

            for grad in bias_grads.iter_mut() {
                grad.mapv_inplace(|g| g * scale);
            }
        }
    }
}
