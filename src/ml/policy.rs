use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

use super::distributions::{apply_squashing, gaussian_likelihood, scale_log_std};
use super::network::{Activation, BodyInputs, ModelBody, NetworkParams, OutputLayer};
use crate::env::ObservationSpec;
use crate::error::NetworkError;

/// Output of a stochastic policy pass, already squashed and scaled.
#[derive(Clone, Debug)]
pub struct PolicyOutput<B: Backend> {
    /// Deterministic action.
    pub mu: Tensor<B, 2>,
    /// Sampled action.
    pub pi: Tensor<B, 2>,
    /// Log-probability of `pi`.
    pub logp_pi: Tensor<B, 1>,
}

/// Squashed Gaussian policy used by SAC.
#[derive(Module, Debug)]
pub struct GaussianPolicy<B: Backend> {
    body: ModelBody<B>,
    mu: OutputLayer<B>,
    log_std: OutputLayer<B>,
    action_scale: f32,
}

impl<B: Backend> GaussianPolicy<B> {
    pub fn new(
        params: &NetworkParams,
        spec: &ObservationSpec,
        use_prev_action: bool,
        device: &B::Device,
    ) -> Result<Self, NetworkError> {
        let body = ModelBody::new(
            params,
            spec.goal_dim,
            spec.action_dim,
            use_prev_action,
            0,
            device,
        )?;
        let hidden = body.output_size();
        Ok(Self {
            mu: OutputLayer::new(hidden, spec.action_dim, Activation::Linear, device),
            log_std: OutputLayer::new(hidden, spec.action_dim, Activation::Linear, device),
            body,
            action_scale: spec.action_scale,
        })
    }

    pub fn action_scale(&self) -> f32 {
        self.action_scale
    }

    pub fn forward(&self, inputs: &BodyInputs<B>) -> PolicyOutput<B> {
        let net = self.body.forward(inputs, None);
        let mu = self.mu.forward(net.clone());
        let log_std = scale_log_std(self.log_std.forward(net));
        let std = log_std.clone().exp();
        let noise = Tensor::random(mu.dims(), Distribution::Normal(0.0, 1.0), &mu.device());
        let pi = mu.clone() + noise * std;
        let logp_pi = gaussian_likelihood(pi.clone(), mu.clone(), log_std);
        let (mu, pi, logp_pi) = apply_squashing(mu, pi, logp_pi);
        PolicyOutput {
            mu: mu.mul_scalar(self.action_scale),
            pi: pi.mul_scalar(self.action_scale),
            logp_pi,
        }
    }
}

/// Deterministic tanh policy used by TD3.
#[derive(Module, Debug)]
pub struct DeterministicPolicy<B: Backend> {
    body: ModelBody<B>,
    output: OutputLayer<B>,
    action_scale: f32,
}

impl<B: Backend> DeterministicPolicy<B> {
    pub fn new(
        params: &NetworkParams,
        spec: &ObservationSpec,
        use_prev_action: bool,
        device: &B::Device,
    ) -> Result<Self, NetworkError> {
        let body = ModelBody::new(
            params,
            spec.goal_dim,
            spec.action_dim,
            use_prev_action,
            0,
            device,
        )?;
        Ok(Self {
            output: OutputLayer::new(body.output_size(), spec.action_dim, Activation::Tanh, device),
            body,
            action_scale: spec.action_scale,
        })
    }

    pub fn action_scale(&self) -> f32 {
        self.action_scale
    }

    pub fn forward(&self, inputs: &BodyInputs<B>) -> Tensor<B, 2> {
        let net = self.body.forward(inputs, None);
        self.output.forward(net).mul_scalar(self.action_scale)
    }
}

/// Number of scalar parameters in a module.
pub fn count_vars<B: Backend, M: Module<B>>(module: &M) -> usize {
    module.num_params()
}
