//! CSV scalar log.
//!
//! Writes one `step,tag,value,wall_time` row per scalar into
//! `<log_dir>/scalars.csv`, which plotting scripts or spreadsheet tools can
//! read directly.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{EpochRecord, MetricsSink};
use crate::algorithms::LossStats;
use crate::error::Result;

pub struct ScalarWriter {
    log_dir: PathBuf,
    start: Instant,
    writer: BufWriter<File>,
}

impl ScalarWriter {
    /// Create `log_dir` if needed and start a fresh `scalars.csv` in it
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        create_dir_all(&log_dir)?;

        let mut writer = BufWriter::new(File::create(log_dir.join("scalars.csv"))?);
        writeln!(writer, "step,tag,value,wall_time")?;

        Ok(ScalarWriter {
            log_dir,
            start: Instant::now(),
            writer,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Log a scalar value
    pub fn add_scalar(&mut self, step: usize, tag: &str, value: f32) -> Result<()> {
        let wall_time = self.start.elapsed().as_secs_f64();
        writeln!(self.writer, "{},{},{},{:.3}", step, tag, value, wall_time)?;
        Ok(())
    }

    /// Log several scalars under `main_tag/`
    pub fn add_scalars(&mut self, step: usize, main_tag: &str, values: &[(&str, f32)]) -> Result<()> {
        for (tag, value) in values {
            self.add_scalar(step, &format!("{}/{}", main_tag, tag), *value)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl MetricsSink for ScalarWriter {
    fn record_update(&mut self, env_step: usize, losses: &LossStats) -> Result<()> {
        self.add_scalars(
            env_step,
            "loss",
            &[
                ("policy", losses.policy_loss),
                ("value", losses.value_loss),
                ("entropy", losses.entropy),
                ("total", losses.total_loss),
                ("grad_norm", losses.grad_norm),
            ],
        )
    }

    fn record_epoch(&mut self, record: &EpochRecord) -> Result<()> {
        self.add_scalars(
            record.env_steps,
            "train",
            &[("reward", record.train_reward), ("length", record.train_length)],
        )?;
        self.add_scalars(
            record.env_steps,
            "test",
            &[
                ("reward", record.eval_reward),
                ("reward_std", record.eval_reward_std),
                ("best_reward", record.best_reward),
            ],
        )?;
        self.flush()
    }
}

impl Drop for ScalarWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
