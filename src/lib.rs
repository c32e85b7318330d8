//! # mptcp-tuner: RL control of multipath subflow buffering
//!
//! A reinforcement-learning controller that tunes per-subflow
//! buffering/scheduling behavior of a multipath transport connection
//! from periodic telemetry (throughput, RTT, congestion window,
//! receive-buffer occupancy, retransmissions).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐    poll     ┌──────────────────────┐
//! │ TelemetrySource  │────────────▶│     TransportEnv     │
//! │ (injected)       │             │ windows + reward     │
//! └──────────────────┘             └──────────┬───────────┘
//!        ▲                                    │ observation
//!        │ traffic on the connection          ▼
//! ┌──────┴───────────┐             ┌──────────────────────┐
//! │ TrafficGenerator │             │  NafAgent (+OuNoise) │
//! │ (background task)│             │  mu(s) ─▶ action     │
//! └──────────────────┘             └──────────┬───────────┘
//!                                             │ transition
//!                                             ▼
//!                                  ┌──────────────────────┐
//!                                  │     ReplayBuffer     │
//!                                  │ ring + uniform batch │
//!                                  └──────────┬───────────┘
//!                                             │ minibatch
//!                                             ▼
//!                                  ┌──────────────────────┐
//!                                  │ update: Q(s,a) → y   │
//!                                  │ Adam + grad clip     │
//!                                  │ Polyak target blend  │
//!                                  └──────────────────────┘
//! ```
//!
//! The policy is a Normalized Advantage Function network: the action
//! value decomposes into `Q(s,u) = V(s) - 0.5 (u-mu)ᵀ P(s) (u-mu)` with
//! `P(s)` positive semi-definite by construction, so the greedy action is
//! `mu(s)` in closed form and bootstrapped targets use the target
//! network's value head directly (`y = r + γ V_target(s')`).
//!
//! The control action is currently an output-only signal: the
//! [`telemetry::Actuator`] seam is reserved and nothing is applied to
//! the transport layer.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mptcp_tuner::agent::naf_agent;
//! use mptcp_tuner::config::{AgentConfig, EnvConfig, NoiseConfig, TrainerConfig};
//! use mptcp_tuner::env::TransportEnv;
//! use mptcp_tuner::telemetry::ScriptedTelemetry;
//! use mptcp_tuner::traffic::NoopTraffic;
//! use mptcp_tuner::trainer::Trainer;
//! use burn::backend::{Autodiff, NdArray};
//!
//! type B = Autodiff<NdArray<f32>>;
//!
//! let env_config = EnvConfig::new(2, 8);
//! let source = ScriptedTelemetry::new(2, 200);
//! let env = TransportEnv::new(source, env_config.clone()).unwrap();
//! let agent = naf_agent::<B>(&env_config, AgentConfig::default(), Default::default()).unwrap();
//!
//! let mut trainer = Trainer::new(
//!     env,
//!     agent,
//!     NoopTraffic,
//!     NoiseConfig::default(),
//!     TrainerConfig::new(100),
//! )
//! .unwrap();
//! let report = trainer.run().unwrap();
//! println!("mean reward: {}", report.mean_reward());
//! ```

pub mod agent;
pub mod config;
pub mod env;
pub mod metrics;
pub mod noise;
pub mod replay;
pub mod telemetry;
pub mod traffic;
pub mod trainer;

pub use agent::{naf_agent, ControlPolicy, NafAgent, NafPolicy, NafPolicyConfig};
pub use config::{AgentConfig, ConfigError, EnvConfig, NoiseConfig, TrainerConfig};
pub use env::{StepOutcome, SubflowWindow, TransportEnv};
pub use metrics::{ConsoleLogger, ElapsedTimeLog, EpisodeSnapshot, MetricsLogger, MultiLogger, Phase};
pub use noise::OuNoise;
pub use replay::{ReplayBuffer, Transition};
pub use telemetry::{Actuator, ConnMeta, NullActuator, ScriptedTelemetry, SubflowSample, TelemetrySource};
pub use traffic::{BulkTransfer, NoopTraffic, TrafficGenerator, TrafficHandle};
pub use trainer::{TrainError, Trainer, TrainingReport};
