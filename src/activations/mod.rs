//! # Activation Functions Module
//!
//! Element-wise non-linearities used by the hidden layers of the bundled
//! actor-critic networks. Output heads use [`Activation::Linear`]: the actor
//! emits raw logits (softmax is applied by [`crate::distributions`]) and the
//! critic emits an unbounded scalar value.
//!
//! ## Available Activations
//!
//! - **ReLU**: `max(0, x)` - default for hidden layers
//! - **Tanh**: hyperbolic tangent, outputs between -1 and 1
//! - **LeakyReLU**: ReLU with small negative slope
//! - **Linear**: identity, used for output heads

pub mod functions;

pub use functions::Activation;
