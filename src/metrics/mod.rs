//! # Metrics Module
//!
//! Push-only sinks for training metrics. The trainer reports loss statistics
//! after every update call and one [`EpochRecord`] after every evaluation;
//! sinks decide what to keep and where to put it.

pub mod scalar_writer;
pub mod statistics;
pub mod tracker;

use serde::{Serialize, Deserialize};

use crate::algorithms::LossStats;
use crate::error::Result;

pub use scalar_writer::ScalarWriter;
pub use statistics::Statistics;
pub use tracker::{MetricsTracker, TrainingMetrics};

/// Summary of one finished epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Cumulative environment steps over the whole run
    pub env_steps: usize,
    pub gradient_steps: usize,
    /// Mean reward of training episodes finished during the epoch
    pub train_reward: f32,
    pub train_length: f32,
    pub eval_reward: f32,
    pub eval_reward_std: f32,
    pub best_reward: f32,
    pub best_epoch: usize,
    /// Mean of the epoch's update statistics
    pub losses: LossStats,
}

pub trait MetricsSink {
    fn record_update(&mut self, env_step: usize, losses: &LossStats) -> Result<()>;

    fn record_epoch(&mut self, record: &EpochRecord) -> Result<()>;
}
