//! CartPole solved with PPO
//!
//! Optionally reads a JSON config given as the first argument; missing fields
//! take the PPO defaults. Logs go to `logdir/task/ppo[/note]/scalars.csv` and
//! the best policy to `policy.bin` next to it. Set `RUST_LOG=debug` to see
//! every update.

use onpolicy::algorithms::UpdateRule;
use onpolicy::env::CartPole;
use onpolicy::error::Result;
use onpolicy::metrics::ScalarWriter;
use onpolicy::policy::ActorCriticBuilder;
use onpolicy::trainer::{run_dir, FileCheckpoint, OnPolicyTrainer, TrainerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TrainerConfig::from_json_file(path)?,
        None => TrainerConfig::default(),
    };

    let model = ActorCriticBuilder::new(4, 2)
        .hidden_sizes(config.hidden_sizes.clone())
        .shared_trunk(config.shared_trunk)
        .seed(config.seed)
        .build()?;
    let rule = UpdateRule::ppo_from(&config)?;
    let writer = ScalarWriter::new(run_dir(&config, rule.name()))?;
    let checkpoint = FileCheckpoint::from_config(&config, rule.name());
    let render = config.render;

    let mut trainer = OnPolicyTrainer::from_config(config, rule, model, CartPole::new)?
        .with_checkpoint(checkpoint.clone())
        .with_sink(writer);

    let result = trainer.run()?;
    println!(
        "Finished after {} epochs ({} env steps, {:.1}s): best test reward {:.1} at epoch {}",
        result.epochs_run,
        result.env_steps,
        result.duration.as_secs_f32(),
        result.best_reward,
        result.best_epoch
    );
    println!("Best policy saved to {}", checkpoint.path().display());

    let watched = trainer.watch(CartPole::new(), render)?;
    println!("Final reward: {}, length: {}", watched.mean_reward, watched.mean_length);
    Ok(())
}
