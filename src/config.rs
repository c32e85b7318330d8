//! Configuration for the tuner.
//!
//! All knobs are plain typed structs with builder methods; loading them
//! from a file or CLI is the embedding process's job. Validation is
//! fail-fast: every struct has a `validate()` that rejects hyperparameters
//! the core cannot run with (non-positive window, zero capacity, discount
//! outside (0, 1], inverted action bounds) with a descriptive error.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Error raised when a configuration value is out of range.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// Name of the offending field.
    pub field: &'static str,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Environment
// ============================================================================

/// Windowed-aggregation and reward-shaping parameters.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Number of subflows the connection is expected to carry.
    pub subflows: usize,
    /// Window length `k`: telemetry ticks retained per feature sequence.
    /// Must be even (the policy network folds each window block into a
    /// two-channel sequence) and at least 2.
    pub window: usize,
    /// Sampling period between telemetry polls.
    pub interval: Duration,
    /// Warm-up delay after enabling telemetry retention, before the
    /// first baseline sample.
    pub warmup: Duration,
    /// Reward gain on summed per-window throughput deltas.
    pub throughput_gain: f32,
    /// Reward gain on receive-buffer occupancy.
    pub buffer_gain: f32,
    /// Penalty on the per-tick retransmission delta.
    pub retrans_penalty: f32,
    /// Record RTT as the delta of consecutive samples instead of the
    /// absolute value.
    pub rtt_as_delta: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            subflows: 2,
            window: 8,
            interval: Duration::from_millis(100),
            warmup: Duration::from_secs(1),
            throughput_gain: 0.01,
            buffer_gain: 0.03,
            retrans_penalty: 0.05,
            rtt_as_delta: false,
        }
    }
}

impl EnvConfig {
    /// Create a config with default reward shaping.
    pub fn new(subflows: usize, window: usize) -> Self {
        Self {
            subflows,
            window,
            ..Default::default()
        }
    }

    /// Set the sampling period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the warm-up delay.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the reward coefficients (throughput, buffer, retransmission).
    pub fn with_reward_shaping(mut self, throughput: f32, buffer: f32, retrans: f32) -> Self {
        self.throughput_gain = throughput;
        self.buffer_gain = buffer;
        self.retrans_penalty = retrans;
        self
    }

    /// Record RTT deltas instead of absolute RTT values.
    pub fn with_rtt_as_delta(mut self, enabled: bool) -> Self {
        self.rtt_as_delta = enabled;
        self
    }

    /// Flattened observation length: per subflow, three windows of `k`
    /// plus the two shared connection scalars.
    pub fn observation_len(&self) -> usize {
        self.subflows * (3 * self.window + 2)
    }

    /// Reject values the aggregator and policy network cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subflows == 0 {
            return Err(ConfigError::new("subflows", "must be at least 1"));
        }
        if self.window < 2 {
            return Err(ConfigError::new("window", "must be at least 2"));
        }
        if self.window % 2 != 0 {
            return Err(ConfigError::new("window", "must be even"));
        }
        for (field, value) in [
            ("throughput_gain", self.throughput_gain),
            ("buffer_gain", self.buffer_gain),
            ("retrans_penalty", self.retrans_penalty),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::new(field, "must be finite"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Agent
// ============================================================================

/// Policy-network and optimization hyperparameters.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Discount factor for bootstrapped targets.
    pub gamma: f32,
    /// Target-network blend rate per update step.
    pub tau: f32,
    /// Width of the shared hidden representation.
    pub hidden_size: usize,
    /// Width of each per-subflow embedding.
    pub embed_size: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Gradient-norm clip bound applied before each optimizer step.
    pub grad_clip: f32,
    /// Lower bound of the emitted control action.
    pub action_low: f32,
    /// Upper bound of the emitted control action.
    pub action_high: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 0.001,
            hidden_size: 128,
            embed_size: 16,
            learning_rate: 1e-3,
            grad_clip: 1.0,
            action_low: 1.0,
            action_high: 4.0,
        }
    }
}

impl AgentConfig {
    /// Set the discount factor.
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the target blend rate.
    pub fn with_tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }

    /// Set the hidden width.
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Set the Adam learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the action bounds.
    pub fn with_action_bounds(mut self, low: f32, high: f32) -> Self {
        self.action_low = low;
        self.action_high = high;
        self
    }

    /// Reject hyperparameters the agent cannot be constructed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(ConfigError::new("gamma", "must be in (0, 1]"));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(ConfigError::new("tau", "must be in (0, 1]"));
        }
        if self.hidden_size == 0 {
            return Err(ConfigError::new("hidden_size", "must be positive"));
        }
        if self.embed_size == 0 {
            return Err(ConfigError::new("embed_size", "must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ConfigError::new("learning_rate", "must be positive and finite"));
        }
        if !(self.grad_clip > 0.0 && self.grad_clip.is_finite()) {
            return Err(ConfigError::new("grad_clip", "must be positive and finite"));
        }
        if !(self.action_low < self.action_high) {
            return Err(ConfigError::new(
                "action_low",
                "must be strictly below action_high",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Exploration Noise
// ============================================================================

/// Ornstein–Uhlenbeck process parameters and annealing schedule.
#[derive(Debug, Clone)]
pub struct NoiseConfig {
    /// Mean-reversion rate.
    pub theta: f32,
    /// Diffusion magnitude.
    pub sigma: f32,
    /// Long-run mean the process reverts towards.
    pub mu: f32,
    /// Scale applied during the first episode.
    pub noise_scale: f32,
    /// Scale held from `exploration_end` onwards.
    pub final_noise_scale: f32,
    /// Number of early episodes over which the scale anneals linearly.
    pub exploration_end: usize,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            theta: 0.15,
            sigma: 0.2,
            mu: 0.0,
            noise_scale: 0.3,
            final_noise_scale: 0.1,
            exploration_end: 100,
        }
    }
}

impl NoiseConfig {
    /// Set the annealing schedule endpoints.
    pub fn with_schedule(mut self, initial: f32, fin: f32, exploration_end: usize) -> Self {
        self.noise_scale = initial;
        self.final_noise_scale = fin;
        self.exploration_end = exploration_end;
        self
    }

    /// Noise scale for a given episode index: linear interpolation from
    /// `noise_scale` down to `final_noise_scale` over the first
    /// `exploration_end` episodes, constant afterwards.
    pub fn scale_for_episode(&self, episode: usize) -> f32 {
        let remaining = self.exploration_end.saturating_sub(episode) as f32;
        (self.noise_scale - self.final_noise_scale) * remaining / self.exploration_end as f32
            + self.final_noise_scale
    }

    /// Reject parameters the process cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.theta > 0.0 && self.theta.is_finite()) {
            return Err(ConfigError::new("theta", "must be positive and finite"));
        }
        if !(self.sigma >= 0.0 && self.sigma.is_finite()) {
            return Err(ConfigError::new("sigma", "must be non-negative and finite"));
        }
        if !self.mu.is_finite() {
            return Err(ConfigError::new("mu", "must be finite"));
        }
        if self.noise_scale < 0.0 || self.final_noise_scale < 0.0 {
            return Err(ConfigError::new("noise_scale", "must be non-negative"));
        }
        if self.exploration_end == 0 {
            return Err(ConfigError::new("exploration_end", "must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// Trainer
// ============================================================================

/// Episode-loop and replay parameters.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Total number of episodes to run.
    pub episodes: usize,
    /// Fraction of episodes spent in the training phase; the remainder
    /// runs noise-free with learning disabled.
    pub train_fraction: f32,
    /// Replay buffer capacity.
    pub replay_capacity: usize,
    /// Minibatch size per update.
    pub batch_size: usize,
    /// Gradient updates issued per environment tick once the buffer is
    /// sufficiently populated.
    pub updates_per_step: usize,
    /// Updates start once the buffer holds more than
    /// `warmup_multiple * batch_size` transitions.
    pub warmup_multiple: usize,
    /// Text log receiving one elapsed-time line per evaluation episode.
    pub times_log: PathBuf,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            episodes: 100,
            train_fraction: 0.9,
            replay_capacity: 1_000_000,
            batch_size: 64,
            updates_per_step: 5,
            warmup_multiple: 5,
            times_log: PathBuf::from("times.txt"),
        }
    }
}

impl TrainerConfig {
    /// Create a config for the given episode count.
    pub fn new(episodes: usize) -> Self {
        Self {
            episodes,
            ..Default::default()
        }
    }

    /// Set the replay capacity.
    pub fn with_replay_capacity(mut self, capacity: usize) -> Self {
        self.replay_capacity = capacity;
        self
    }

    /// Set the minibatch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of updates per environment tick.
    pub fn with_updates_per_step(mut self, updates: usize) -> Self {
        self.updates_per_step = updates;
        self
    }

    /// Set the training-phase fraction.
    pub fn with_train_fraction(mut self, fraction: f32) -> Self {
        self.train_fraction = fraction;
        self
    }

    /// Set the evaluation elapsed-time log path.
    pub fn with_times_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.times_log = path.into();
        self
    }

    /// Number of episodes that run in the training phase.
    pub fn training_episodes(&self) -> usize {
        (self.train_fraction * self.episodes as f32).ceil() as usize
    }

    /// Reject parameters the episode loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.episodes == 0 {
            return Err(ConfigError::new("episodes", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.train_fraction) {
            return Err(ConfigError::new("train_fraction", "must be in [0, 1]"));
        }
        if self.replay_capacity == 0 {
            return Err(ConfigError::new("replay_capacity", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::new("batch_size", "must be positive"));
        }
        if self.batch_size > self.replay_capacity {
            return Err(ConfigError::new(
                "batch_size",
                "must not exceed replay_capacity",
            ));
        }
        if self.updates_per_step == 0 {
            return Err(ConfigError::new("updates_per_step", "must be positive"));
        }
        Ok(())
    }
}
