//! NAF policy-value network.
//!
//! The network maps a flattened telemetry observation to a state value
//! `V(s)`, an action mean `mu(s)` and, when an action is supplied, an
//! action value `Q(s, u)` through a quadratic advantage term:
//!
//! ```text
//! A(s, u) = -0.5 * (u - mu)^T P(s) (u - mu),   P(s) = L(s) L(s)^T
//! Q(s, u) = V(s) + A(s, u)
//! ```
//!
//! `L(s)` is lower-triangular with an exponentiated (strictly positive)
//! diagonal, so `P(s)` is symmetric positive semi-definite and the
//! advantage is a concave quadratic maximized exactly at `u = mu(s)`.
//! That gives `max_u Q(s, u) = V(s)` in closed form: greedy action
//! selection needs neither an action search nor a second network.
//!
//! # Input layout
//!
//! The observation is the per-subflow layout produced by
//! [`TransportEnv::observation`](crate::env::TransportEnv::observation):
//! per subflow, three windows of `k` ticks followed by two shared
//! connection scalars. Each subflow's `3k` window block is folded into a
//! two-channel sequence and run through its own small convolutional
//! encoder; the per-subflow embeddings plus the shared scalars feed a
//! normalized MLP trunk. One action dimension per subflow.

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::pool::{MaxPool1d, MaxPool1dConfig};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig, PaddingConfig1d};
use burn::tensor::activation::{relu, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Convolution width of every subflow encoder.
const CONV_CHANNELS: usize = 16;

// ============================================================================
// Configuration
// ============================================================================

/// Shape parameters for [`NafPolicy`].
#[derive(Debug, Clone)]
pub struct NafPolicyConfig {
    /// Number of subflows (and action dimensions).
    pub subflows: usize,
    /// Telemetry window length `k`; must be even and at least 2.
    pub window: usize,
    /// Width of the shared hidden representation.
    pub hidden_size: usize,
    /// Width of each per-subflow embedding.
    pub embed_size: usize,
}

impl NafPolicyConfig {
    /// Create a config with default widths.
    pub fn new(subflows: usize, window: usize) -> Self {
        Self {
            subflows,
            window,
            hidden_size: 128,
            embed_size: 16,
        }
    }

    /// Set the hidden width.
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Set the per-subflow embedding width.
    pub fn with_embed_size(mut self, embed_size: usize) -> Self {
        self.embed_size = embed_size;
        self
    }

    /// Flattened observation length the network consumes.
    pub fn observation_len(&self) -> usize {
        self.subflows * (3 * self.window + 2)
    }

    /// Action dimension (one directive per subflow).
    pub fn action_dim(&self) -> usize {
        self.subflows
    }

    /// Initialize the network on the given device.
    ///
    /// # Panics
    ///
    /// Panics on shapes the encoder cannot fold; `EnvConfig::validate`
    /// rejects these upstream.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NafPolicy<B> {
        assert!(self.subflows >= 1, "at least one subflow required");
        assert!(
            self.window >= 2 && self.window % 2 == 0,
            "window must be even and >= 2"
        );
        assert!(self.hidden_size > 0 && self.embed_size > 0);

        let conv_len = 3 * self.window / 2;
        // kernel 4, stride 1, padding 1, then a window-halving max-pool
        let conv_out = conv_len - 1;
        let pooled = conv_out / 2;
        let flat = CONV_CHANNELS * pooled;

        let encoders = (0..self.subflows)
            .map(|_| SubflowEncoder {
                conv: Conv1dConfig::new(2, CONV_CHANNELS, 4)
                    .with_padding(PaddingConfig1d::Explicit(1))
                    .init(device),
                pool: MaxPool1dConfig::new(2).with_stride(2).init(),
                project: LinearConfig::new(flat, self.embed_size).init(device),
            })
            .collect();

        let feat = self.subflows * self.embed_size + 2;
        let hidden = self.hidden_size;
        let a = self.subflows;

        NafPolicy {
            encoders,
            norm_in: LayerNormConfig::new(feat).init(device),
            linear1: LinearConfig::new(feat, hidden).init(device),
            norm1: LayerNormConfig::new(hidden).init(device),
            linear2: LinearConfig::new(hidden, hidden).init(device),
            norm2: LayerNormConfig::new(hidden).init(device),
            value: LinearConfig::new(hidden, 1).init(device),
            mean: LinearConfig::new(hidden, a).init(device),
            factor: LinearConfig::new(hidden, a * a).init(device),
            subflows: self.subflows,
            window: self.window,
        }
    }
}

// ============================================================================
// Modules
// ============================================================================

/// Convolutional encoder for one subflow's window block.
#[derive(Module, Debug)]
pub struct SubflowEncoder<B: Backend> {
    conv: Conv1d<B>,
    pool: MaxPool1d,
    project: Linear<B>,
}

impl<B: Backend> SubflowEncoder<B> {
    fn forward(&self, seg: Tensor<B, 3>) -> Tensor<B, 2> {
        let x = relu(self.conv.forward(seg));
        let x = self.pool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 2);
        self.project.forward(x)
    }
}

/// Value and action-mean heads evaluated for a batch of observations.
#[derive(Debug, Clone)]
pub struct NafOutput<B: Backend> {
    /// State values `V(s)`, shape `[batch, 1]`.
    pub value: Tensor<B, 2>,
    /// Action means `mu(s)` in [-1, 1], shape `[batch, action_dim]`.
    pub mean: Tensor<B, 2>,
}

/// NAF action-value network over windowed subflow telemetry.
#[derive(Module, Debug)]
pub struct NafPolicy<B: Backend> {
    encoders: Vec<SubflowEncoder<B>>,
    norm_in: LayerNorm<B>,
    linear1: Linear<B>,
    norm1: LayerNorm<B>,
    linear2: Linear<B>,
    norm2: LayerNorm<B>,
    value: Linear<B>,
    mean: Linear<B>,
    factor: Linear<B>,
    subflows: usize,
    window: usize,
}

impl<B: Backend> NafPolicy<B> {
    /// Action dimension (one per subflow).
    pub fn action_dim(&self) -> usize {
        self.subflows
    }

    /// Observation length this network consumes.
    pub fn observation_len(&self) -> usize {
        self.subflows * (3 * self.window + 2)
    }

    /// Shared trunk: per-subflow encoders, shared scalars, normalized MLP.
    fn encode(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = obs.dims();
        let stride = 3 * self.window + 2;
        let seg_len = 3 * self.window;

        let mut parts: Vec<Tensor<B, 2>> = Vec::with_capacity(self.encoders.len() + 1);
        for (i, encoder) in self.encoders.iter().enumerate() {
            let seg = obs
                .clone()
                .narrow(1, i * stride, seg_len)
                .reshape([batch, 2, seg_len / 2]);
            parts.push(encoder.forward(seg));
        }
        // The connection scalars repeat per subflow block; one copy feeds
        // the trunk as the auxiliary tail.
        parts.push(obs.narrow(1, stride * self.encoders.len() - 2, 2));

        let x = Tensor::cat(parts, 1);
        let x = self.norm_in.forward(x);
        let x = tanh(self.norm1.forward(self.linear1.forward(x)));
        tanh(self.norm2.forward(self.linear2.forward(x)))
    }

    /// Evaluate `V(s)` and `mu(s)` for a batch of observations.
    pub fn forward(&self, obs: Tensor<B, 2>) -> NafOutput<B> {
        let h = self.encode(obs);
        NafOutput {
            value: self.value.forward(h.clone()),
            mean: tanh(self.mean.forward(h)),
        }
    }

    /// Evaluate `Q(s, u)` for supplied actions (training path).
    ///
    /// Returns the action values `[batch, 1]` together with the heads.
    pub fn action_value(&self, obs: Tensor<B, 2>, actions: Tensor<B, 2>) -> (Tensor<B, 2>, NafOutput<B>) {
        let h = self.encode(obs);
        let v = self.value.forward(h.clone());
        let mu = tanh(self.mean.forward(h.clone()));

        let a = self.subflows;
        let [batch, _] = mu.dims();
        let lraw = self.factor.forward(h).reshape([batch, a, a]);
        let l = cholesky_factor(lraw);
        let p = l.clone().matmul(l.transpose());

        let d = (actions - mu.clone()).reshape([batch, a, 1]);
        let advantage = d
            .clone()
            .transpose()
            .matmul(p.matmul(d))
            .reshape([batch, 1])
            .mul_scalar(-0.5);

        (
            v.clone() + advantage,
            NafOutput {
                value: v,
                mean: mu,
            },
        )
    }
}

/// Mask a raw square matrix into a valid Cholesky-style factor: strict
/// lower triangle kept, diagonal exponentiated, strict upper zeroed.
///
/// The exponentiated diagonal is strictly positive, which makes
/// `P = L L^T` symmetric positive semi-definite by construction.
pub(crate) fn cholesky_factor<B: Backend>(raw: Tensor<B, 3>) -> Tensor<B, 3> {
    let [_, a, _] = raw.dims();
    let device = raw.device();

    let mut tril = vec![0.0f32; a * a];
    let mut diag = vec![0.0f32; a * a];
    for r in 0..a {
        for c in 0..a {
            if r > c {
                tril[r * a + c] = 1.0;
            } else if r == c {
                diag[r * a + c] = 1.0;
            }
        }
    }
    let tril = Tensor::<B, 1>::from_floats(tril.as_slice(), &device).reshape([1, a, a]);
    let diag = Tensor::<B, 1>::from_floats(diag.as_slice(), &device).reshape([1, a, a]);

    raw.clone() * tril + raw.exp() * diag
}
