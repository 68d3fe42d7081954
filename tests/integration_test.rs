use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{array, Array1};
use onpolicy::{
    algorithms::UpdateRule,
    data::{CollectRequest, Collector, ExperienceBuffer},
    env::{CartPole, Environment, Step, VectorEnv},
    error::Result,
    metrics::ScalarWriter,
    policy::{ActorCritic, ActorCriticBuilder, ActorCriticModel},
    trainer::{FileCheckpoint, OnPolicyTrainer, TrainerConfig},
};

/// Five-step episodes paying +1 for action 0 and -1 for action 1
struct PreferZero {
    t: usize,
}

impl Environment for PreferZero {
    fn observation_size(&self) -> usize {
        2
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Array1<f32>> {
        self.t = 0;
        Ok(array![0.0, 1.0])
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        self.t += 1;
        Ok(Step {
            observation: array![self.t as f32 / 5.0, 1.0],
            reward: if action == 0 { 1.0 } else { -1.0 },
            done: self.t >= 5,
        })
    }

    fn seed(&mut self, _seed: u64) {}
}

/// One-step episodes whose reward follows a script, advancing on every reset
struct Scripted {
    rewards: Vec<f32>,
    resets: Arc<AtomicUsize>,
    current: f32,
}

impl Environment for Scripted {
    fn observation_size(&self) -> usize {
        2
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Array1<f32>> {
        let i = self.resets.fetch_add(1, Ordering::SeqCst);
        self.current = self.rewards[i.min(self.rewards.len() - 1)];
        Ok(array![0.0, 1.0])
    }

    fn step(&mut self, _action: usize) -> Result<Step> {
        Ok(Step {
            observation: array![0.0, 1.0],
            reward: self.current,
            done: true,
        })
    }

    fn seed(&mut self, _seed: u64) {}
}

fn toy_config() -> TrainerConfig {
    TrainerConfig {
        task: "PreferZero".to_string(),
        seed: 7,
        lr: 0.05,
        epoch: 10,
        step_per_epoch: 200,
        collect_per_step: 40,
        training_num: 4,
        test_num: 4,
        hidden_sizes: vec![16],
        ..TrainerConfig::a2c_defaults()
    }
}

fn model(config: &TrainerConfig) -> ActorCritic {
    ActorCriticBuilder::new(2, 2)
        .hidden_sizes(config.hidden_sizes.clone())
        .seed(config.seed)
        .build()
        .unwrap()
}

#[test]
fn test_a2c_learns_rewarded_action() {
    let config = toy_config();
    let rule = UpdateRule::a2c_from(&config).unwrap();
    let mut trainer = OnPolicyTrainer::from_config(config.clone(), rule, model(&config), || PreferZero { t: 0 })
        .unwrap()
        .without_stop_fn();

    let result = trainer.run().unwrap();
    assert_eq!(result.epochs_run, 10);
    assert_eq!(result.env_steps, 2000);
    assert!(trainer.train_collector().buffer().unwrap().is_empty());

    let probs = trainer
        .model()
        .distribution(array![[0.4, 1.0]].view())
        .unwrap()
        .probs()
        .clone();
    assert!(probs[[0, 0]] > 0.9, "P(action 0) = {}", probs[[0, 0]]);
}

#[test]
fn test_ppo_learns_rewarded_action() {
    let config = TrainerConfig {
        lr: 0.01,
        repeat_per_collect: 4,
        batch_size: 32,
        epoch: 8,
        ..toy_config()
    };
    let rule = UpdateRule::ppo_from(&config).unwrap();
    let mut trainer = OnPolicyTrainer::from_config(config.clone(), rule, model(&config), || PreferZero { t: 0 })
        .unwrap()
        .without_stop_fn();

    let result = trainer.run().unwrap();
    // a uniform policy scores 0; always picking action 0 scores 5
    assert!(result.best_reward >= 3.0, "best reward {}", result.best_reward);
    assert!(result.gradient_steps > result.epochs_run * 5);
}

#[test]
fn test_stops_once_threshold_reached() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainerConfig {
        epoch: 10,
        step_per_epoch: 10,
        collect_per_step: 10,
        training_num: 2,
        test_num: 1,
        reward_threshold: Some(9.0),
        logdir: dir.path().to_string_lossy().into_owned(),
        ..toy_config()
    };
    let resets = Arc::new(AtomicUsize::new(0));
    let test_env = Scripted {
        rewards: vec![0.0, 5.0, 9.0, 10.0],
        resets: Arc::clone(&resets),
        current: 0.0,
    };

    let train = Collector::new(
        VectorEnv::from_fn(2, || PreferZero { t: 0 }).unwrap(),
        Some(ExperienceBuffer::new(config.buffer_size).unwrap()),
    );
    let test = Collector::new(VectorEnv::new(vec![Box::new(test_env)]).unwrap(), None);
    let rule = UpdateRule::a2c_from(&config).unwrap();
    let checkpoint = FileCheckpoint::from_config(&config, rule.name());
    let path = checkpoint.path().to_path_buf();
    let threshold = config.reward_threshold.unwrap();

    let mut trainer = OnPolicyTrainer::new(config.clone(), rule, model(&config), train, test)
        .unwrap()
        .with_stop_fn(move |reward| reward >= threshold)
        .with_checkpoint(checkpoint);

    let result = trainer.run().unwrap();
    assert!(result.stopped_early);
    assert_eq!(result.epochs_run, 3);
    assert_eq!(result.best_epoch, 3);
    assert_eq!(result.best_reward, 9.0);
    assert_eq!(result.final_reward, 9.0);
    assert_eq!(resets.load(Ordering::SeqCst), 3);
    assert_eq!(trainer.metrics().eval_rewards(), vec![0.0, 5.0, 9.0]);

    assert!(path.ends_with("PreferZero/a2c/policy.bin"));
    let restored = ActorCritic::load(&path).unwrap();
    let obs = array![[0.2, 1.0]];
    assert_eq!(
        restored.predict(obs.view()).unwrap().logits,
        trainer.model().predict(obs.view()).unwrap().logits
    );
}

#[test]
fn test_cartpole_smoke_run_with_scalar_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainerConfig {
        epoch: 2,
        step_per_epoch: 100,
        collect_per_step: 50,
        training_num: 4,
        test_num: 2,
        hidden_sizes: vec![16, 16],
        parallel_envs: true,
        logdir: dir.path().to_string_lossy().into_owned(),
        ..TrainerConfig::default()
    };
    let model = ActorCriticBuilder::new(4, 2)
        .hidden_sizes(config.hidden_sizes.clone())
        .seed(config.seed)
        .build()
        .unwrap();
    let rule = UpdateRule::ppo_from(&config).unwrap();
    let writer = ScalarWriter::new(onpolicy::trainer::run_dir(&config, rule.name())).unwrap();
    let log_file = writer.log_dir().join("scalars.csv");

    let mut trainer = OnPolicyTrainer::from_config(config, rule, model, CartPole::new)
        .unwrap()
        .with_sink(writer);
    let result = trainer.run().unwrap();

    // a random CartPole policy never balances for 195 steps
    assert!(!result.stopped_early);
    assert_eq!(result.epochs_run, 2);
    assert_eq!(result.test_episodes, 4);
    assert!(result.best_reward > 0.0);

    let log = std::fs::read_to_string(log_file).unwrap();
    assert!(log.starts_with("step,tag,value,wall_time"));
    assert!(log.contains("test/reward"));
    assert!(log.contains("loss/total"));

    let watched = trainer.watch(CartPole::new(), 0.0).unwrap();
    assert_eq!(watched.n_episodes, 1);
    assert!(watched.mean_reward >= 1.0);
}

#[test]
fn test_collector_feeds_update_directly() {
    let config = toy_config();
    let mut model = model(&config);
    let mut collector = Collector::new(
        VectorEnv::from_fn(3, || PreferZero { t: 0 }).unwrap(),
        Some(ExperienceBuffer::new(100).unwrap()),
    );
    collector.seed(1);

    let stats = collector.collect(&model, CollectRequest::Steps(30)).unwrap();
    assert_eq!(stats.n_steps, 30);
    assert_eq!(stats.n_episodes, 6);

    let batch = collector.buffer().unwrap().sample_all().unwrap();
    assert_eq!(batch.len(), 30);
    let rule = UpdateRule::a2c_from(&config).unwrap();
    let mut rng = rand::thread_rng();
    let losses = rule.update(&mut model, &batch, &mut rng).unwrap();
    assert_eq!(losses.gradient_steps, 1);
}
