//! Policy networks and the control-policy strategy seam.
//!
//! [`ControlPolicy`] is the interface the trainer drives: any
//! continuous-control strategy that can pick a bounded action from an
//! observation and learn from replayed transitions can slot in. The NAF
//! agent is the implementation shipped here; an actor-critic variant
//! (e.g. DDPG-style, with an explicit actor network instead of the
//! closed-form maximizer) would implement the same trait rather than
//! forking the trainer.

pub mod naf;
pub mod network;
pub mod polyak;

pub use naf::{naf_agent, NafAgent};
pub use network::{NafOutput, NafPolicy, NafPolicyConfig};
pub use polyak::{hard_copy, soft_update};

use crate::noise::OuNoise;
use crate::replay::Transition;

/// Continuous-control strategy driven by the trainer.
pub trait ControlPolicy {
    /// Number of action dimensions the policy emits.
    fn action_dim(&self) -> usize;

    /// Select an action for the observation, adding one exploration-noise
    /// sample when provided. Output is clamped to the control range.
    fn select_action(&self, state: &[f32], noise: Option<&mut OuNoise>) -> Vec<f32>;

    /// Learn from a sampled minibatch; returns the update loss.
    fn update(&mut self, batch: &[Transition]) -> f32;
}
