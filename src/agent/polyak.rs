//! Polyak (soft) parameter blending between online and target networks.
//!
//! Bootstrapped targets become unstable when the same network produces
//! both prediction and target. The target network is an independently
//! owned copy that tracks the online network slowly:
//!
//! ```text
//! theta_target = tau * theta_online + (1 - tau) * theta_target
//! ```
//!
//! Parameters are matched by module traversal order, which is
//! deterministic for two independently created models of the same
//! architecture, so blending works between structurally identical
//! networks without relying on shared parameter ids. Synchronization is
//! always an explicit copy ([`hard_copy`], at construction) or a blend
//! ([`soft_update`], every update step) — the two networks never alias
//! storage.

use burn::module::{Module, ModuleMapper, ParamId};
use burn::prelude::*;
use std::cell::RefCell;

/// One parameter tensor flattened to 1-D.
///
/// Flattening sidesteps const-generic dimension mismatches when tensors
/// of different ranks are collected into one list.
struct FlattenedParam<B: Backend> {
    tensor: Tensor<B, 1>,
}

/// Collects every float parameter of a module in traversal order.
struct ParamExtractor<B: Backend> {
    params: Vec<FlattenedParam<B>>,
}

impl<B: Backend> ParamExtractor<B> {
    fn new() -> Self {
        Self { params: Vec::new() }
    }
}

impl<B: Backend> ModuleMapper<B> for ParamExtractor<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let total: usize = tensor.dims().iter().product();
        self.params.push(FlattenedParam {
            tensor: tensor.clone().reshape([total]),
        });
        tensor
    }
}

/// Interpolates target parameters towards the collected online ones.
struct BlendMapper<B: Backend> {
    online: Vec<FlattenedParam<B>>,
    tau: f32,
    index: RefCell<usize>,
}

impl<B: Backend> ModuleMapper<B> for BlendMapper<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let shape = tensor.dims();
        let total: usize = shape.iter().product();

        let idx = *self.index.borrow();
        *self.index.borrow_mut() = idx + 1;

        match self.online.get(idx) {
            Some(online) => {
                let target_flat = tensor.reshape([total]);
                let blended = online.tensor.clone().mul_scalar(self.tau)
                    + target_flat.mul_scalar(1.0 - self.tau);
                blended.reshape(shape)
            }
            // Architectures diverged; keep the target parameter.
            None => tensor,
        }
    }
}

/// Blend the target model towards the online model.
///
/// `tau = 0` returns the target unchanged; `tau = 1` is equivalent to a
/// full copy of the online parameters.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if (tau - 1.0).abs() < 1e-6 {
        return online.clone();
    }
    if tau.abs() < 1e-6 {
        return target;
    }

    let mut extractor = ParamExtractor::new();
    let _ = online.clone().map(&mut extractor);

    let mut blender = BlendMapper {
        online: extractor.params,
        tau,
        index: RefCell::new(0),
    };
    target.map(&mut blender)
}

/// Full parameter copy, used once to initialize the target network.
pub fn hard_copy<B, M>(online: &M) -> M
where
    B: Backend,
    M: Module<B> + Clone,
{
    online.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = NdArray<f32>;

    fn linear_pair() -> (Linear<TestBackend>, Linear<TestBackend>) {
        let device = Default::default();
        (
            LinearConfig::new(4, 4).init(&device),
            LinearConfig::new(4, 4).init(&device),
        )
    }

    fn weights(layer: &Linear<TestBackend>) -> Vec<f32> {
        layer
            .weight
            .val()
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn tau_zero_leaves_target_unchanged() {
        let (online, target) = linear_pair();
        let before = weights(&target);

        let updated = soft_update::<TestBackend, _>(&online, target, 0.0);

        for (t, u) in before.iter().zip(weights(&updated).iter()) {
            assert_eq!(t, u, "tau=0 must be a no-op");
        }
    }

    #[test]
    fn tau_one_equals_hard_copy() {
        let (online, target) = linear_pair();
        let online_w = weights(&online);

        let updated = soft_update::<TestBackend, _>(&online, target, 1.0);

        for (o, u) in online_w.iter().zip(weights(&updated).iter()) {
            assert!((o - u).abs() < 1e-7, "tau=1 must copy online weights");
        }
    }

    #[test]
    fn intermediate_tau_interpolates_every_parameter() {
        let (online, target) = linear_pair();
        let online_w = weights(&online);
        let target_w = weights(&target);

        let tau = 0.25;
        let updated = soft_update::<TestBackend, _>(&online, target, tau);
        let updated_w = weights(&updated);

        for i in 0..online_w.len() {
            let expected = tau * online_w[i] + (1.0 - tau) * target_w[i];
            assert!(
                (updated_w[i] - expected).abs() < 1e-6,
                "index {}: expected {}, got {}",
                i,
                expected,
                updated_w[i]
            );
        }
    }

    #[test]
    fn bias_parameters_are_blended_too() {
        let device = Default::default();
        let online: Linear<TestBackend> = LinearConfig::new(3, 3).with_bias(true).init(&device);
        let target: Linear<TestBackend> = LinearConfig::new(3, 3).with_bias(true).init(&device);

        let online_b = online
            .bias
            .as_ref()
            .unwrap()
            .val()
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec();
        let target_b = target
            .bias
            .as_ref()
            .unwrap()
            .val()
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec();

        let tau = 0.5;
        let updated = soft_update::<TestBackend, _>(&online, target, tau);
        let updated_b = updated
            .bias
            .as_ref()
            .unwrap()
            .val()
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec();

        for i in 0..online_b.len() {
            let expected = tau * online_b[i] + (1.0 - tau) * target_b[i];
            assert!((updated_b[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn hard_copy_matches_online() {
        let (online, _) = linear_pair();
        let copy = hard_copy::<TestBackend, _>(&online);
        assert_eq!(weights(&online), weights(&copy));
    }

    #[test]
    fn repeated_blending_converges_towards_online() {
        let (online, mut target) = linear_pair();
        let online_w = weights(&online);

        for _ in 0..2_000 {
            target = soft_update::<TestBackend, _>(&online, target, 0.01);
        }

        for (o, t) in online_w.iter().zip(weights(&target).iter()) {
            assert!((o - t).abs() < 1e-3, "target failed to track online");
        }
    }
}
