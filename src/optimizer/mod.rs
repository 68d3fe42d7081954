pub mod gradient_clipper;

use ndarray::{Array, Array1, Array2, Dimension, Zip};
use serde::{Serialize, Deserialize};

pub use gradient_clipper::GradientClipper;

/// Parameter update rule.
///
/// Every parameter tensor of a model is addressed by a stable `slot` index so
/// stateful optimizers can keep per-tensor moments. `begin_step` is called once
/// before the slots of one gradient step are updated.
pub trait Optimizer {
    fn begin_step(&mut self) {}
    fn update_weights(&mut self, slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32);
    fn update_biases(&mut self, slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32);
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
    RMSProp(RMSProp),
}

impl Optimizer for OptimizerWrapper {
    fn begin_step(&mut self) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.begin_step(),
            OptimizerWrapper::Adam(optimizer) => optimizer.begin_step(),
            OptimizerWrapper::RMSProp(optimizer) => optimizer.begin_step(),
        }
    }

    fn update_weights(&mut self, slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_weights(slot, weights, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_weights(slot, weights, gradients, learning_rate),
            OptimizerWrapper::RMSProp(optimizer) => optimizer.update_weights(slot, weights, gradients, learning_rate),
        }
    }

    fn update_biases(&mut self, slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update_biases(slot, biases, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update_biases(slot, biases, gradients, learning_rate),
            OptimizerWrapper::RMSProp(optimizer) => optimizer.update_biases(slot, biases, gradients, learning_rate),
        }
    }
}

impl Default for OptimizerWrapper {
    fn default() -> Self {
        OptimizerWrapper::Adam(Adam::default())
    }
}

/// Fetch the state tensor for `slot`, (re)allocating zeros when missing or reshaped.
fn moment<D: Dimension>(store: &mut Vec<Option<Array<f32, D>>>, slot: usize, dim: D) -> &mut Array<f32, D> {
    if store.len() <= slot {
        store.resize(slot + 1, None);
    }
    let entry = &mut store[slot];
    let stale = !matches!(entry, Some(m) if m.raw_dim() == dim);
    if stale {
        *entry = Some(Array::zeros(dim.clone()));
    }
    entry.get_or_insert_with(|| Array::zeros(dim))
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn update_weights(&mut self, _slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        weights.zip_mut_with(gradients, |w, &g| *w -= learning_rate * g);
    }

    fn update_biases(&mut self, _slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        biases.zip_mut_with(gradients, |b, &g| *b -= learning_rate * g);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m_weights: Vec<Option<Array2<f32>>>,
    v_weights: Vec<Option<Array2<f32>>>,
    m_biases: Vec<Option<Array1<f32>>>,
    v_biases: Vec<Option<Array1<f32>>>,
    /// Number of completed `begin_step` calls
    pub t: i32,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m_weights: Vec::new(),
            v_weights: Vec::new(),
            m_biases: Vec::new(),
            v_biases: Vec::new(),
            t: 0,
        }
    }

    fn coefficients(&self) -> AdamCoefficients {
        AdamCoefficients {
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            t: self.t,
        }
    }
}

fn adam_apply<D: Dimension>(
    adam: &AdamCoefficients,
    param: &mut Array<f32, D>,
    gradients: &Array<f32, D>,
    m: &mut Array<f32, D>,
    v: &mut Array<f32, D>,
    learning_rate: f32,
) {
    let t = adam.t.max(1);
    let bias_correction1 = 1.0 - adam.beta1.powi(t);
    let bias_correction2 = 1.0 - adam.beta2.powi(t);

    Zip::from(param)
        .and(gradients)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = adam.beta1 * *m + (1.0 - adam.beta1) * g;
            *v = adam.beta2 * *v + (1.0 - adam.beta2) * g * g;
            let m_hat = *m / bias_correction1;
            let v_hat = *v / bias_correction2;
            *p -= learning_rate * m_hat / (v_hat.sqrt() + adam.epsilon);
        });
}

struct AdamCoefficients {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: i32,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update_weights(&mut self, slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        let coefficients = self.coefficients();
        let m = moment(&mut self.m_weights, slot, weights.raw_dim());
        let v = moment(&mut self.v_weights, slot, weights.raw_dim());
        adam_apply(&coefficients, weights, gradients, m, v, learning_rate);
    }

    fn update_biases(&mut self, slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        let coefficients = self.coefficients();
        let m = moment(&mut self.m_biases, slot, biases.raw_dim());
        let v = moment(&mut self.v_biases, slot, biases.raw_dim());
        adam_apply(&coefficients, biases, gradients, m, v, learning_rate);
    }
}

/// RMSProp optimizer
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RMSProp {
    pub beta: f32,
    pub epsilon: f32,
    v_weights: Vec<Option<Array2<f32>>>,
    v_biases: Vec<Option<Array1<f32>>>,
}

impl RMSProp {
    pub fn new(beta: f32, epsilon: f32) -> Self {
        RMSProp {
            beta,
            epsilon,
            v_weights: Vec::new(),
            v_biases: Vec::new(),
        }
    }
}

impl Default for RMSProp {
    fn default() -> Self {
        Self::new(0.99, 1e-5)
    }
}

fn rmsprop_apply<D: Dimension>(
    param: &mut Array<f32, D>,
    gradients: &Array<f32, D>,
    v: &mut Array<f32, D>,
    beta: f32,
    epsilon: f32,
    learning_rate: f32,
) {
    Zip::from(param).and(gradients).and(v).for_each(|p, &g, v| {
        *v = beta * *v + (1.0 - beta) * g * g;
        *p -= learning_rate * g / (v.sqrt() + epsilon);
    });
}

impl Optimizer for RMSProp {
    fn update_weights(&mut self, slot: usize, weights: &mut Array2<f32>, gradients: &Array2<f32>, learning_rate: f32) {
        let v = moment(&mut self.v_weights, slot, weights.raw_dim());
        rmsprop_apply(weights, gradients, v, self.beta, self.epsilon, learning_rate);
    }

    fn update_biases(&mut self, slot: usize, biases: &mut Array1<f32>, gradients: &Array1<f32>, learning_rate: f32) {
        let v = moment(&mut self.v_biases, slot, biases.raw_dim());
        rmsprop_apply(biases, gradients, v, self.beta, self.epsilon, learning_rate);
    }
}
