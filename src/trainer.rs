//! Episode loop driving environment, policy, replay and noise.
//!
//! Each episode: start the background traffic task, reset the
//! environment (which primes the telemetry windows), reset and re-scale
//! the exploration noise, then tick until the connection tears down.
//! Every tick stores a transition and, once the replay buffer holds more
//! than a warmup multiple of the batch size, issues a fixed number of
//! gradient updates.
//!
//! The run switches from the training phase (noise-driven exploration,
//! continual learning) to the evaluation phase (noise-free, learning
//! disabled) once the configured fraction of episodes has elapsed.
//! Evaluation episodes append their wall-clock duration to a plain text
//! log, one line per episode.
//!
//! The loop is single-threaded and cooperative: it blocks in the
//! environment's sampling sleeps and during updates. A transition is
//! only ever sampled after the `step` that produced it has returned.

use std::fmt;
use std::io;
use std::time::Instant;

use crate::agent::ControlPolicy;
use crate::config::{ConfigError, NoiseConfig, TrainerConfig};
use crate::env::TransportEnv;
use crate::metrics::{ConsoleLogger, ElapsedTimeLog, EpisodeSnapshot, MetricsLogger, Phase};
use crate::noise::OuNoise;
use crate::replay::{ReplayBuffer, Transition};
use crate::telemetry::TelemetrySource;
use crate::traffic::TrafficGenerator;

/// Error raised by the training loop.
#[derive(Debug)]
pub enum TrainError {
    /// Invalid configuration rejected at construction.
    Config(ConfigError),
    /// Telemetry, traffic or log I/O failure.
    Io(io::Error),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Config(e) => write!(f, "{}", e),
            TrainError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for TrainError {}

impl From<ConfigError> for TrainError {
    fn from(e: ConfigError) -> Self {
        TrainError::Config(e)
    }
}

impl From<io::Error> for TrainError {
    fn from(e: io::Error) -> Self {
        TrainError::Io(e)
    }
}

/// Aggregate results of a completed run.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    /// Cumulative shaped reward per episode.
    pub episode_rewards: Vec<f32>,
    /// Wall-clock seconds per evaluation episode.
    pub eval_times: Vec<f32>,
    /// Environment ticks across all episodes.
    pub total_ticks: u64,
    /// Gradient updates issued.
    pub updates: u64,
}

impl TrainingReport {
    /// Mean reward over all episodes.
    pub fn mean_reward(&self) -> f32 {
        if self.episode_rewards.is_empty() {
            return 0.0;
        }
        self.episode_rewards.iter().sum::<f32>() / self.episode_rewards.len() as f32
    }
}

/// Episode state machine over an environment, policy and traffic source.
pub struct Trainer<P, T, G>
where
    P: ControlPolicy,
    T: TelemetrySource,
    G: TrafficGenerator,
{
    env: TransportEnv<T>,
    policy: P,
    traffic: G,
    noise: OuNoise,
    replay: ReplayBuffer,
    noise_config: NoiseConfig,
    config: TrainerConfig,
    logger: Box<dyn MetricsLogger>,
    times_log: Option<ElapsedTimeLog>,
}

impl<P, T, G> Trainer<P, T, G>
where
    P: ControlPolicy,
    T: TelemetrySource,
    G: TrafficGenerator,
{
    /// Create a trainer; validates the loop and noise configuration.
    pub fn new(
        env: TransportEnv<T>,
        policy: P,
        traffic: G,
        noise_config: NoiseConfig,
        config: TrainerConfig,
    ) -> Result<Self, TrainError> {
        config.validate()?;
        noise_config.validate()?;

        let noise = OuNoise::new(policy.action_dim(), &noise_config, 0x6d70_7463);
        let replay = ReplayBuffer::new(config.replay_capacity);

        Ok(Self {
            env,
            policy,
            traffic,
            noise,
            replay,
            noise_config,
            config,
            logger: Box::new(ConsoleLogger::new()),
            times_log: None,
        })
    }

    /// Replace the episode logger.
    pub fn with_logger<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.logger = Box::new(logger);
        self
    }

    /// Reseed the exploration noise.
    pub fn with_noise_seed(mut self, seed: u64) -> Self {
        self.noise = OuNoise::new(self.policy.action_dim(), &self.noise_config, seed);
        self
    }

    /// The replay buffer (observability and tests).
    pub fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    /// The trained policy, consuming the trainer.
    pub fn into_policy(self) -> P {
        self.policy
    }

    /// Run the configured number of episodes.
    pub fn run(&mut self) -> Result<TrainingReport, TrainError> {
        let training_episodes = self.config.training_episodes();
        let mut report = TrainingReport::default();

        for episode in 0..self.config.episodes {
            let phase = if episode < training_episodes {
                Phase::Training
            } else {
                Phase::Evaluation
            };

            let traffic = self.traffic.spawn()?;
            let started = Instant::now();

            let mut state = self.env.reset()?;
            let scale = match phase {
                Phase::Training => self.noise_config.scale_for_episode(episode),
                Phase::Evaluation => 0.0,
            };
            self.noise.set_scale(scale);
            self.noise.reset();

            let mut episode_reward = 0.0f32;
            let mut loss_sum = 0.0f32;
            let mut loss_count = 0u32;
            let mut ticks = 0u64;

            loop {
                let action = match phase {
                    Phase::Training => self.policy.select_action(&state, Some(&mut self.noise)),
                    Phase::Evaluation => self.policy.select_action(&state, None),
                };

                let outcome = self.env.step(&action)?;
                ticks = outcome.tick;
                episode_reward += outcome.reward;

                if phase == Phase::Training {
                    let mask = if outcome.done { 0.0 } else { 1.0 };
                    self.replay.push(Transition::new(
                        state,
                        action,
                        mask,
                        outcome.state.clone(),
                        outcome.reward,
                    ));

                    if self.replay.len() > self.config.warmup_multiple * self.config.batch_size {
                        for _ in 0..self.config.updates_per_step {
                            if let Some(batch) = self.replay.sample(self.config.batch_size) {
                                loss_sum += self.policy.update(&batch);
                                loss_count += 1;
                                report.updates += 1;
                            }
                        }
                    }
                }

                state = outcome.state;
                if outcome.done {
                    break;
                }
            }

            let elapsed = started.elapsed().as_secs_f32();
            if phase == Phase::Evaluation {
                self.append_eval_time(elapsed)?;
                report.eval_times.push(elapsed);
            }
            report.episode_rewards.push(episode_reward);
            report.total_ticks += ticks;

            self.logger.log(&EpisodeSnapshot {
                episode,
                phase,
                reward: episode_reward,
                ticks,
                noise_scale: scale,
                mean_loss: if loss_count > 0 {
                    loss_sum / loss_count as f32
                } else {
                    0.0
                },
                elapsed_secs: elapsed,
            });

            traffic.join()?;
            log::debug!("episode {} finished after {} ticks", episode, ticks);
        }

        self.logger.flush();
        Ok(report)
    }

    fn append_eval_time(&mut self, elapsed_secs: f32) -> io::Result<()> {
        if self.times_log.is_none() {
            self.times_log = Some(ElapsedTimeLog::open(&self.config.times_log)?);
        }
        let times = self.times_log.as_mut().expect("just opened");
        times.record(elapsed_secs)?;
        times.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::metrics::NullLogger;
    use crate::telemetry::ScriptedTelemetry;
    use crate::traffic::NoopTraffic;
    use std::cell::Cell;
    use std::time::Duration;

    /// Policy stub that emits a constant directive and counts calls.
    struct StubPolicy {
        dim: usize,
        selections: Cell<usize>,
        noisy_selections: Cell<usize>,
        updates: usize,
    }

    impl StubPolicy {
        fn new(dim: usize) -> Self {
            Self {
                dim,
                selections: Cell::new(0),
                noisy_selections: Cell::new(0),
                updates: 0,
            }
        }
    }

    impl ControlPolicy for StubPolicy {
        fn action_dim(&self) -> usize {
            self.dim
        }

        fn select_action(&self, _state: &[f32], noise: Option<&mut OuNoise>) -> Vec<f32> {
            self.selections.set(self.selections.get() + 1);
            if noise.is_some() {
                self.noisy_selections.set(self.noisy_selections.get() + 1);
            }
            vec![1.0; self.dim]
        }

        fn update(&mut self, batch: &[Transition]) -> f32 {
            self.updates += 1;
            assert!(!batch.is_empty());
            0.25
        }
    }

    fn fast_env(ticks_per_episode: u64, window: usize) -> TransportEnv<ScriptedTelemetry> {
        let source = ScriptedTelemetry::new(2, ticks_per_episode);
        let config = EnvConfig::new(2, window)
            .with_interval(Duration::ZERO)
            .with_warmup(Duration::ZERO);
        TransportEnv::new(source, config).unwrap()
    }

    fn temp_times_log(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("mptcp_tuner_trainer_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("times_{}.txt", tag));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn run_splits_training_and_evaluation_phases() {
        // 1 baseline + 2 warm-up + 4 live steps per episode.
        let env = fast_env(1 + 2 + 4, 2);
        let path = temp_times_log("phases");
        let config = TrainerConfig::new(2)
            .with_train_fraction(0.5)
            .with_replay_capacity(64)
            .with_batch_size(2)
            .with_updates_per_step(2)
            .with_times_log(&path);
        let mut trainer = Trainer::new(
            env,
            StubPolicy::new(2),
            NoopTraffic,
            NoiseConfig::default(),
            {
                let mut c = config;
                c.warmup_multiple = 1;
                c
            },
        )
        .unwrap()
        .with_logger(NullLogger);

        let report = trainer.run().unwrap();

        assert_eq!(report.episode_rewards.len(), 2);
        assert_eq!(report.eval_times.len(), 1);
        assert!(report.updates > 0);

        // Only the training episode stores transitions: 4 live + 1 terminal.
        assert_eq!(trainer.replay().len(), 5);

        // One elapsed-time line for the single evaluation episode.
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let _ = std::fs::remove_file(&path);

        let policy = trainer.into_policy();
        // Noise accompanies selection only during the training phase.
        assert!(policy.noisy_selections.get() < policy.selections.get());
        assert!(policy.updates > 0);
    }

    #[test]
    fn updates_wait_for_the_warmup_threshold() {
        let env = fast_env(1 + 2 + 3, 2);
        let path = temp_times_log("warmup");
        let config = TrainerConfig::new(1)
            .with_train_fraction(1.0)
            .with_replay_capacity(64)
            .with_batch_size(8)
            .with_times_log(&path);
        // 4 transitions stored, threshold is 5 * 8: no update may run.
        let mut trainer = Trainer::new(
            env,
            StubPolicy::new(2),
            NoopTraffic,
            NoiseConfig::default(),
            config,
        )
        .unwrap()
        .with_logger(NullLogger);

        let report = trainer.run().unwrap();
        assert_eq!(report.updates, 0);
        assert!(!path.exists(), "training-only run must not touch the times log");
    }

    #[test]
    fn invalid_trainer_config_is_rejected() {
        let env = fast_env(8, 2);
        let config = TrainerConfig::new(0);
        let result = Trainer::new(
            env,
            StubPolicy::new(2),
            NoopTraffic,
            NoiseConfig::default(),
            config,
        );
        assert!(matches!(result, Err(TrainError::Config(_))));
    }

    #[test]
    fn terminal_transition_carries_zero_mask() {
        let env = fast_env(1 + 2 + 2, 2);
        let path = temp_times_log("mask");
        let config = TrainerConfig::new(1)
            .with_train_fraction(1.0)
            .with_replay_capacity(16)
            .with_batch_size(4)
            .with_times_log(&path);
        let mut trainer = Trainer::new(
            env,
            StubPolicy::new(2),
            NoopTraffic,
            NoiseConfig::default(),
            config,
        )
        .unwrap()
        .with_logger(NullLogger);

        trainer.run().unwrap();

        let masks: Vec<f32> = trainer.replay().iter().map(|t| t.mask).collect();
        assert_eq!(masks.iter().filter(|&&m| m == 0.0).count(), 1);
        assert_eq!(masks.iter().filter(|&&m| m == 1.0).count(), masks.len() - 1);
    }
}
