//! Polyak-averaged target networks.

use burn::module::{Module, ModuleMapper, Param};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Collects detached, flattened parameters in traversal order.
struct ParamCollector<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for ParamCollector<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let value = param.val();
        let numel = value.dims().iter().product::<usize>();
        self.params.push(value.detach().reshape([numel]));
        param
    }
}

/// θ_target ← τ·θ_online + (1 − τ)·θ_target, matched by traversal order.
struct PolyakMapper<B: Backend> {
    online: std::vec::IntoIter<Tensor<B, 1>>,
    tau: f32,
}

impl<B: Backend> ModuleMapper<B> for PolyakMapper<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let Some(online) = self.online.next() else {
            return param;
        };
        let target = param.val().detach();
        let shape = target.dims();
        let blended = online.reshape(shape).mul_scalar(self.tau) + target.mul_scalar(1.0 - self.tau);
        Param::initialized(param.id.clone(), blended.detach())
    }
}

/// Moves `target` towards `online` by `tau`. Target parameters never carry
/// autodiff history.
pub fn soft_update<B: Backend, M: Module<B>>(online: &M, target: M, tau: f32) -> M {
    let mut collector = ParamCollector { params: Vec::new() };
    let _ = online.clone().map(&mut collector);
    let mut mapper = PolyakMapper {
        online: collector.params.into_iter(),
        tau: tau.clamp(0.0, 1.0),
    };
    target.map(&mut mapper)
}

/// Detached copy of `online`, used to initialise targets.
pub fn hard_copy<B: Backend, M: Module<B>>(online: &M) -> M {
    soft_update(online, online.clone(), 1.0)
}
