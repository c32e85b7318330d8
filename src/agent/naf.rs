//! NAF agent: online/target network pair with off-policy updates.
//!
//! The agent owns two structurally identical [`NafPolicy`] networks. The
//! online network is trained by Adam with gradient-norm clipping; the
//! target network starts as a full copy and tracks the online one by
//! Polyak blending after every update. Because `max_u Q(s, u) = V(s)`
//! holds analytically for the NAF decomposition, the bootstrapped target
//! uses the target network's value head directly:
//!
//! ```text
//! y = r + gamma * V_target(s')
//! ```
//!
//! and the update minimizes the mean-squared error between `Q(s, a)` and
//! `y`. Action selection evaluates only the action mean, on the
//! non-autodiff inner backend, so inference never touches gradient state
//! or normalization statistics.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;

use super::network::{NafPolicy, NafPolicyConfig};
use super::polyak;
use super::ControlPolicy;
use crate::config::{AgentConfig, ConfigError, EnvConfig};
use crate::noise::OuNoise;
use crate::replay::Transition;

/// Mean-squared error between action values and bootstrapped targets.
fn mse_loss<B: Backend>(predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    (predictions - targets).powf_scalar(2.0).mean()
}

/// NAF agent over a multipath connection's observation space.
pub struct NafAgent<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<NafPolicy<B>, B>,
{
    online: NafPolicy<B>,
    target: NafPolicy<B>,
    optimizer: O,
    gamma: f32,
    tau: f32,
    learning_rate: f64,
    action_low: f32,
    action_high: f32,
    device: B::Device,
}

/// Build a NAF agent for the given environment shape and hyperparameters.
///
/// Fails fast on hyperparameters the agent cannot be constructed with.
pub fn naf_agent<B: AutodiffBackend>(
    env: &EnvConfig,
    config: AgentConfig,
    device: B::Device,
) -> Result<NafAgent<B, impl Optimizer<NafPolicy<B>, B>>, ConfigError> {
    env.validate()?;
    config.validate()?;

    let online = NafPolicyConfig::new(env.subflows, env.window)
        .with_hidden_size(config.hidden_size)
        .with_embed_size(config.embed_size)
        .init::<B>(&device);
    let target = polyak::hard_copy::<B, _>(&online);

    let optimizer = AdamConfig::new()
        .with_grad_clipping(Some(GradientClippingConfig::Norm(config.grad_clip)))
        .init::<B, NafPolicy<B>>();

    Ok(NafAgent {
        online,
        target,
        optimizer,
        gamma: config.gamma,
        tau: config.tau,
        learning_rate: config.learning_rate,
        action_low: config.action_low,
        action_high: config.action_high,
        device,
    })
}

impl<B, O> NafAgent<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<NafPolicy<B>, B>,
{
    /// The online network.
    pub fn online(&self) -> &NafPolicy<B> {
        &self.online
    }

    /// The target network.
    pub fn target(&self) -> &NafPolicy<B> {
        &self.target
    }

    /// Greedy action (plus optional exploration noise), clamped to the
    /// configured control range.
    pub fn select_action(&self, state: &[f32], noise: Option<&mut OuNoise>) -> Vec<f32> {
        let policy = self.online.valid();
        let device = <B::InnerBackend as Backend>::Device::default();

        let obs = Tensor::<B::InnerBackend, 1>::from_floats(state, &device)
            .reshape([1, state.len()]);
        let mean = policy.forward(obs).mean;
        let mut action: Vec<f32> = mean.into_data().as_slice::<f32>().unwrap().to_vec();

        if let Some(noise) = noise {
            for (a, n) in action.iter_mut().zip(noise.sample()) {
                *a += n;
            }
        }
        for a in action.iter_mut() {
            *a = a.clamp(self.action_low, self.action_high);
        }
        action
    }

    /// One gradient step on a sampled minibatch, then a Polyak blend of
    /// the target network. Returns the TD loss.
    pub fn update(&mut self, batch: &[Transition]) -> f32 {
        if batch.is_empty() {
            return 0.0;
        }
        let batch_size = batch.len();
        let obs_len = batch[0].state.len();
        let action_dim = batch[0].action.len();

        let states: Vec<f32> = batch.iter().flat_map(|t| t.state.iter().copied()).collect();
        let next_states: Vec<f32> = batch
            .iter()
            .flat_map(|t| t.next_state.iter().copied())
            .collect();
        let actions: Vec<f32> = batch.iter().flat_map(|t| t.action.iter().copied()).collect();
        let rewards: Vec<f32> = batch.iter().map(|t| t.reward).collect();

        let states = Tensor::<B, 1>::from_floats(states.as_slice(), &self.device)
            .reshape([batch_size, obs_len]);
        let next_states = Tensor::<B, 1>::from_floats(next_states.as_slice(), &self.device)
            .reshape([batch_size, obs_len]);
        let actions = Tensor::<B, 1>::from_floats(actions.as_slice(), &self.device)
            .reshape([batch_size, action_dim]);
        let rewards = Tensor::<B, 1>::from_floats(rewards.as_slice(), &self.device)
            .reshape([batch_size, 1]);

        // Bootstrapped target from the target network's value head.
        let next_values = self.target.forward(next_states).value.detach();
        let targets = rewards + next_values.mul_scalar(self.gamma);

        let (q, _) = self.online.action_value(states, actions);
        let loss = mse_loss(q, targets);
        let loss_value = loss.clone().into_data().as_slice::<f32>().unwrap()[0];

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.online);
        self.online = self
            .optimizer
            .step(self.learning_rate, self.online.clone(), grads);

        let target = self.target.clone();
        self.target = polyak::soft_update(&self.online, target, self.tau);

        loss_value
    }
}

impl<B, O> ControlPolicy for NafAgent<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<NafPolicy<B>, B>,
{
    fn action_dim(&self) -> usize {
        self.online.action_dim()
    }

    fn select_action(&self, state: &[f32], noise: Option<&mut OuNoise>) -> Vec<f32> {
        NafAgent::select_action(self, state, noise)
    }

    fn update(&mut self, batch: &[Transition]) -> f32 {
        NafAgent::update(self, batch)
    }
}
