//! CartPole trained with A2C, reloading the best checkpoint at the end

use onpolicy::algorithms::UpdateRule;
use onpolicy::data::{CollectRequest, Collector};
use onpolicy::env::{CartPole, VectorEnv};
use onpolicy::error::Result;
use onpolicy::metrics::ScalarWriter;
use onpolicy::policy::{ActorCritic, ActorCriticBuilder};
use onpolicy::trainer::{run_dir, FileCheckpoint, OnPolicyTrainer, TrainerConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = TrainerConfig {
        epoch: 30,
        parallel_envs: true,
        ..TrainerConfig::a2c_defaults()
    };

    let model = ActorCriticBuilder::new(4, 2)
        .hidden_sizes(config.hidden_sizes.clone())
        .seed(config.seed)
        .build()?;
    let rule = UpdateRule::a2c_from(&config)?;
    let writer = ScalarWriter::new(run_dir(&config, rule.name()))?;
    let checkpoint = FileCheckpoint::from_config(&config, rule.name());

    let mut trainer = OnPolicyTrainer::from_config(config.clone(), rule, model, CartPole::new)?
        .with_checkpoint(checkpoint.clone())
        .with_sink(writer);
    let result = trainer.run()?;
    println!(
        "Stopped early: {}, best reward {:.1} at epoch {}",
        result.stopped_early, result.best_reward, result.best_epoch
    );

    if let Some(avg) = trainer.metrics().avg_eval_reward(5) {
        println!("Average test reward over the last 5 epochs: {:.1}", avg);
    }

    // evaluate the saved best policy on fresh environments
    let best = ActorCritic::load(checkpoint.path())?;
    let mut evaluator = Collector::new(VectorEnv::from_fn(config.test_num, CartPole::new)?, None);
    evaluator.seed(config.seed + 1);
    let stats = evaluator.collect(&best, CollectRequest::Episodes(20))?;
    println!("Best policy: {:.1} ± {:.1} over {} episodes", stats.mean_reward, stats.reward_std, stats.n_episodes);
    Ok(())
}
