use burn::module::Module;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::network::{BodyInputs, ModelBody, NetworkParams, OutputLayer};
use crate::env::ObservationSpec;
use crate::error::NetworkError;

/// Q(s, a) with the action concatenated before the dense stack.
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    body: ModelBody<B>,
    output: OutputLayer<B>,
}

impl<B: Backend> QNetwork<B> {
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
            spec.action_dim,
            device,
        )?;
        Ok(Self {
            output: OutputLayer::new(body.output_size(), 1, params.output_activation, device),
            body,
        })
    }

    pub fn forward(&self, inputs: &BodyInputs<B>, action: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = action.dims();
        let q = self.output.forward(self.body.forward(inputs, Some(action)));
        q.reshape([batch])
    }
}

/// The pair of Q networks shared by TD3 and SAC.
#[derive(Module, Debug)]
pub struct TwinCritic<B: Backend> {
    q1: QNetwork<B>,
    q2: QNetwork<B>,
}

impl<B: Backend> TwinCritic<B> {
    pub fn new(
        params: &NetworkParams,
        spec: &ObservationSpec,
        use_prev_action: bool,
        device: &B::Device,
    ) -> Result<Self, NetworkError> {
        Ok(Self {
            q1: QNetwork::new(params, spec, use_prev_action, device)?,
            q2: QNetwork::new(params, spec, use_prev_action, device)?,
        })
    }

    pub fn forward(
        &self,
        inputs: &BodyInputs<B>,
        action: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, Tensor<B, 1>) {
        (
            self.q1.forward(inputs, action.clone()),
            self.q2.forward(inputs, action),
        )
    }

    pub fn q1(&self, inputs: &BodyInputs<B>, action: Tensor<B, 2>) -> Tensor<B, 1> {
        self.q1.forward(inputs, action)
    }

    pub fn min_q(&self, inputs: &BodyInputs<B>, action: Tensor<B, 2>) -> Tensor<B, 1> {
        let (q1, q2) = self.forward(inputs, action);
        q1.min_pair(q2)
    }
}
