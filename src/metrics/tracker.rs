use std::collections::VecDeque;
use std::path::Path;

use serde::{Serialize, Deserialize};

use super::{EpochRecord, MetricsSink};
use crate::algorithms::LossStats;
use crate::error::Result;

/// Stores training metrics over time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// One record per finished epoch
    pub epochs: VecDeque<EpochRecord>,

    /// Loss statistics of every update call, with the env step it happened at
    pub updates: VecDeque<(usize, LossStats)>,
}

/// In-memory metrics sink with a bounded history
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    metrics: TrainingMetrics,
    history_size: usize,
    update_count: usize,
}

impl MetricsTracker {
    pub fn new(history_size: usize) -> Self {
        MetricsTracker {
            metrics: TrainingMetrics::default(),
            history_size: history_size.max(1),
            update_count: 0,
        }
    }

    fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, limit: usize) {
        if queue.len() >= limit {
            queue.pop_front();
        }
        queue.push_back(value);
    }

    /// Get a reference to the metrics
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Total update calls seen, including ones evicted from the history
    pub fn update_count(&self) -> usize {
        self.update_count
    }

    pub fn last_epoch(&self) -> Option<&EpochRecord> {
        self.metrics.epochs.back()
    }

    pub fn eval_rewards(&self) -> Vec<f32> {
        self.metrics.epochs.iter().map(|e| e.eval_reward).collect()
    }

    /// Mean total loss over the most recent `window` updates
    pub fn avg_loss(&self, window: usize) -> Option<f32> {
        if self.metrics.updates.is_empty() || window == 0 {
            return None;
        }

        let n = window.min(self.metrics.updates.len());
        let sum: f32 = self.metrics.updates.iter().rev().take(n).map(|(_, l)| l.total_loss).sum();
        Some(sum / n as f32)
    }

    /// Mean evaluation reward over the most recent `window` epochs
    pub fn avg_eval_reward(&self, window: usize) -> Option<f32> {
        if self.metrics.epochs.is_empty() || window == 0 {
            return None;
        }

        let n = window.min(self.metrics.epochs.len());
        let sum: f32 = self.metrics.epochs.iter().rev().take(n).map(|e| e.eval_reward).sum();
        Some(sum / n as f32)
    }

    pub fn clear(&mut self) {
        self.metrics = TrainingMetrics::default();
        self.update_count = 0;
    }

    /// Save metrics to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&self.metrics)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Replace the history with one saved by [`MetricsTracker::save`]
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let data = std::fs::read_to_string(path)?;
        self.metrics = serde_json::from_str(&data)?;
        Ok(())
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MetricsSink for MetricsTracker {
    fn record_update(&mut self, env_step: usize, losses: &LossStats) -> Result<()> {
        self.update_count += 1;
        Self::push_bounded(&mut self.metrics.updates, (env_step, *losses), self.history_size);
        Ok(())
    }

    fn record_epoch(&mut self, record: &EpochRecord) -> Result<()> {
        Self::push_bounded(&mut self.metrics.epochs, record.clone(), self.history_size);
        Ok(())
    }
}
