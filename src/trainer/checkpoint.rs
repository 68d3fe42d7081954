use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::TrainerConfig;
use crate::error::Result;

/// Called whenever an epoch sets a new best evaluation reward.
pub trait CheckpointHook<M: ?Sized> {
    fn save(&mut self, model: &M, epoch: usize, eval_reward: f32) -> Result<()>;
}

impl<M, F> CheckpointHook<M> for F
where
    M: ?Sized,
    F: FnMut(&M, usize, f32) -> Result<()>,
{
    fn save(&mut self, model: &M, epoch: usize, eval_reward: f32) -> Result<()> {
        self(model, epoch, eval_reward)
    }
}

/// Writes the model with bincode, overwriting the previous best.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileCheckpoint { path: path.as_ref().to_path_buf() }
    }

    /// `logdir/task/algorithm[/note]/policy.bin`
    pub fn from_config(config: &TrainerConfig, algorithm: &str) -> Self {
        Self::new(run_dir(config, algorithm).join("policy.bin"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Directory holding the logs and checkpoint of one run
pub fn run_dir(config: &TrainerConfig, algorithm: &str) -> PathBuf {
    let mut dir = Path::new(&config.logdir).join(&config.task).join(algorithm);
    if let Some(note) = config.note.as_deref().filter(|n| !n.is_empty()) {
        dir = dir.join(note);
    }
    dir
}

impl<M: Serialize + ?Sized> CheckpointHook<M> for FileCheckpoint {
    fn save(&mut self, model: &M, _epoch: usize, _eval_reward: f32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            create_dir_all(parent)?;
        }
        let serialized = bincode::serialize(model)?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}
