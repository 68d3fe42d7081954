//! # onpolicy - On-Policy Actor-Critic Training
//!
//! A small training pipeline for discrete-action actor-critic agents. A policy
//! is run in a pool of environments, the collected trajectories are turned
//! into return and advantage targets, and the parameters are updated with
//! A2C or PPO. The trainer alternates these phases, evaluates after every
//! epoch, checkpoints the best policy and stops once a reward threshold is
//! reached.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use onpolicy::algorithms::UpdateRule;
//! use onpolicy::env::CartPole;
//! use onpolicy::policy::ActorCriticBuilder;
//! use onpolicy::trainer::{FileCheckpoint, OnPolicyTrainer, TrainerConfig};
//!
//! let config = TrainerConfig { epoch: 5, ..TrainerConfig::default() };
//! let model = ActorCriticBuilder::new(4, 2)
//!     .hidden_sizes(config.hidden_sizes.clone())
//!     .seed(config.seed)
//!     .build()
//!     .unwrap();
//! let rule = UpdateRule::ppo_from(&config).unwrap();
//! let checkpoint = FileCheckpoint::from_config(&config, rule.name());
//!
//! let mut trainer = OnPolicyTrainer::from_config(config, rule, model, CartPole::new)
//!     .unwrap()
//!     .with_checkpoint(checkpoint);
//! let result = trainer.run().unwrap();
//! println!("finished after {} epochs", result.epochs_run);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions for hidden and output layers
//! - [`algorithms`] - A2C and PPO update rules, return and advantage estimation
//! - [`data`] - Transitions, the experience buffer and the collector
//! - [`distributions`] - Categorical action distribution and its gradients
//! - [`env`] - Environment trait, vectorized pools and CartPole
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense layers and weight initialization
//! - [`metrics`] - Statistics, metrics history and scalar logging
//! - [`network`] - Feed-forward network with manual backpropagation
//! - [`optimizer`] - SGD, Adam, RMSProp and gradient clipping
//! - [`policy`] - The actor-critic model interface and its MLP implementation
//! - [`trainer`] - Configuration, checkpointing and the training loop

pub mod activations;
pub mod algorithms;
pub mod data;
pub mod distributions;
pub mod env;
pub mod error;
pub mod layers;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod policy;
pub mod trainer;

#[cfg(test)]
mod tests;
