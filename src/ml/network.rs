use std::fmt;

use burn::constant;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
};
use burn::tensor::Tensor;
use burn::tensor::activation::{gelu, relu, sigmoid, tanh};
use burn::tensor::backend::Backend;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Element-wise activation applied after a layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    Gelu,
    Linear,
}

impl Activation {
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Relu => relu(x),
            Activation::Tanh => tanh(x),
            Activation::Sigmoid => sigmoid(x),
            Activation::Gelu => gelu(x),
            Activation::Linear => x,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Gelu => "gelu",
            Activation::Linear => "linear",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

constant!(Activation);

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Pooling {
    Max,
    Avg,
    None,
}

/// Architecture shared by every policy and value network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub input_dims: [usize; 2],
    pub conv_filters: Vec<usize>,
    pub dense_units: Vec<usize>,
    pub kernel_width: usize,
    pub strides: usize,
    pub pooling: Pooling,
    pub pooling_width: usize,
    pub pooling_strides: usize,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
    pub batch_norm: bool,
    pub dropout: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            input_dims: [100, 100],
            conv_filters: vec![8, 16, 32, 32],
            dense_units: vec![512],
            kernel_width: 3,
            strides: 1,
            pooling: Pooling::Max,
            pooling_width: 2,
            pooling_strides: 2,
            hidden_activation: Activation::Relu,
            output_activation: Activation::Linear,
            batch_norm: false,
            dropout: 0.0,
        }
    }
}

impl NetworkParams {
    pub fn validate(&self) -> Result<(), NetworkError> {
        let invalid = |msg: &str| -> Result<(), NetworkError> {
            Err(NetworkError::InvalidArchitecture(msg.to_string()))
        };
        if self.kernel_width == 0 || self.strides == 0 {
            return invalid("kernel width and strides must be positive");
        }
        if self.pooling != Pooling::None && (self.pooling_width == 0 || self.pooling_strides == 0)
        {
            return invalid("pooling width and strides must be positive");
        }
        if self.conv_filters.iter().chain(&self.dense_units).any(|&n| n == 0) {
            return invalid("layer widths must be positive");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid("dropout must be in [0, 1)");
        }
        self.flat_features().map(|_| ())
    }

    /// Spatial size of the conv stack output as `[channels, height, width]`.
    pub fn conv_output_shape(&self) -> Result<[usize; 3], NetworkError> {
        let [mut height, mut width] = self.input_dims;
        let mut channels = 1;
        for (layer, &filters) in self.conv_filters.iter().enumerate() {
            height = shrink(height, self.kernel_width, self.strides, layer, "conv")?;
            width = shrink(width, self.kernel_width, self.strides, layer, "conv")?;
            if self.pooling != Pooling::None {
                height = shrink(height, self.pooling_width, self.pooling_strides, layer, "pool")?;
                width = shrink(width, self.pooling_width, self.pooling_strides, layer, "pool")?;
            }
            channels = filters;
        }
        Ok([channels, height, width])
    }

    pub fn flat_features(&self) -> Result<usize, NetworkError> {
        self.conv_output_shape().map(|[c, h, w]| c * h * w)
    }
}

fn shrink(
    size: usize,
    window: usize,
    stride: usize,
    layer: usize,
    stage: &str,
) -> Result<usize, NetworkError> {
    if size < window {
        return Err(NetworkError::InvalidArchitecture(format!(
            "{stage} layer {layer} needs at least {window} pixels, feature map has {size}"
        )));
    }
    Ok((size - window) / stride + 1)
}

fn variance_scaling() -> Initializer {
    Initializer::KaimingNormal {
        gain: 1.0,
        fan_out_only: false,
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B>>,
    max_pool: Option<MaxPool2d>,
    avg_pool: Option<AvgPool2d>,
    activation: Activation,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.activation.apply(self.conv.forward(x));
        if let Some(norm) = &self.norm {
            x = norm.forward(x);
        }
        if let Some(pool) = &self.max_pool {
            x = pool.forward(x);
        }
        if let Some(pool) = &self.avg_pool {
            x = pool.forward(x);
        }
        x
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    linear: Linear<B>,
    dropout: Option<Dropout>,
    activation: Activation,
}

impl<B: Backend> DenseBlock<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.apply(self.linear.forward(x));
        match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        }
    }
}

/// Inputs concatenated after the conv stack.
#[derive(Clone, Debug)]
pub struct BodyInputs<B: Backend> {
    pub tactile: Tensor<B, 4>,
    pub goal: Tensor<B, 2>,
    pub prev_action: Tensor<B, 2>,
}

/// Conv base plus dense stack with goal, previous action and (optionally)
/// action concatenated before the dense layers.
#[derive(Module, Debug)]
pub struct ModelBody<B: Backend> {
    conv: Vec<ConvBlock<B>>,
    dense: Vec<DenseBlock<B>>,
    flat_features: usize,
    use_prev_action: bool,
    output_size: usize,
}

impl<B: Backend> ModelBody<B> {
    /// Builds the shared trunk.
    ///
    /// `action_input` is the width of an action concatenated for Q(s, a);
    /// pass zero for policies.
    pub fn new(
        params: &NetworkParams,
        goal_dim: usize,
        action_dim: usize,
        use_prev_action: bool,
        action_input: usize,
        device: &B::Device,
    ) -> Result<Self, NetworkError> {
        params.validate()?;
        let mut conv = Vec::with_capacity(params.conv_filters.len());
        let mut channels = 1;
        for &filters in &params.conv_filters {
            let layer = Conv2dConfig::new([channels, filters], [params.kernel_width; 2])
                .with_stride([params.strides; 2])
                .with_initializer(variance_scaling())
                .init(device);
            let norm = params
                .batch_norm
                .then(|| BatchNormConfig::new(filters).init(device));
            let (max_pool, avg_pool) = match params.pooling {
                Pooling::Max => (
                    Some(
                        MaxPool2dConfig::new([params.pooling_width; 2])
                            .with_strides([params.pooling_strides; 2])
                            .init(),
                    ),
                    None,
                ),
                Pooling::Avg => (
                    None,
                    Some(
                        AvgPool2dConfig::new([params.pooling_width; 2])
                            .with_strides([params.pooling_strides; 2])
                            .init(),
                    ),
                ),
                Pooling::None => (None, None),
            };
            conv.push(ConvBlock {
                conv: layer,
                norm,
                max_pool,
                avg_pool,
                activation: params.hidden_activation,
            });
            channels = filters;
        }

        let flat_features = params.flat_features()?;
        let mut input_size = flat_features + goal_dim + action_input;
        if use_prev_action {
            input_size += action_dim;
        }
        let mut dense = Vec::with_capacity(params.dense_units.len());
        for &units in &params.dense_units {
            let linear = LinearConfig::new(input_size, units)
                .with_initializer(variance_scaling())
                .init(device);
            let dropout = (params.dropout > 0.0).then(|| DropoutConfig::new(params.dropout).init());
            dense.push(DenseBlock {
                linear,
                dropout,
                activation: params.hidden_activation,
            });
            input_size = units;
        }
        Ok(Self {
            conv,
            dense,
            flat_features,
            use_prev_action,
            output_size: input_size,
        })
    }

    /// Width of the last hidden layer.
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn forward(&self, inputs: &BodyInputs<B>, action: Option<Tensor<B, 2>>) -> Tensor<B, 2> {
        let mut x = inputs.tactile.clone();
        for block in &self.conv {
            x = block.forward(x);
        }
        let batch = x.dims()[0];
        let mut parts = vec![x.reshape([batch, self.flat_features]), inputs.goal.clone()];
        if self.use_prev_action {
            parts.push(inputs.prev_action.clone());
        }
        if let Some(action) = action {
            parts.push(action);
        }
        let mut x = Tensor::cat(parts, 1);
        for block in &self.dense {
            x = block.forward(x);
        }
        x
    }
}

/// Dense output layer with its own activation.
#[derive(Module, Debug)]
pub struct OutputLayer<B: Backend> {
    linear: Linear<B>,
    activation: Activation,
}

impl<B: Backend> OutputLayer<B> {
    pub fn new(input: usize, output: usize, activation: Activation, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(input, output).init(device),
            activation,
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.activation.apply(self.linear.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn small_params() -> NetworkParams {
        NetworkParams {
            input_dims: [12, 12],
            conv_filters: vec![4, 8],
            dense_units: vec![16, 16],
            pooling_strides: 1,
            ..NetworkParams::default()
        }
    }

    fn inputs(batch: usize, goal_dim: usize) -> BodyInputs<Backend> {
        let device = Default::default();
        BodyInputs {
            tactile: Tensor::zeros([batch, 1, 12, 12], &device),
            goal: Tensor::zeros([batch, goal_dim], &device),
            prev_action: Tensor::zeros([batch, 2], &device),
        }
    }

    #[test]
    fn conv_output_shape_tracks_every_stage() {
        // 12 -conv3-> 10 -pool2-> 9 -conv3-> 7 -pool2-> 6
        assert_eq!(small_params().conv_output_shape().unwrap(), [8, 6, 6]);
        let unpooled = NetworkParams {
            pooling: Pooling::None,
            ..small_params()
        };
        assert_eq!(unpooled.conv_output_shape().unwrap(), [8, 8, 8]);
    }

    #[test]
    fn default_architecture_is_valid() {
        let params = NetworkParams::default();
        params.validate().expect("default params");
        assert_eq!(params.conv_output_shape().unwrap(), [32, 4, 4]);
    }

    #[test]
    fn too_small_input_is_rejected() {
        let params = NetworkParams {
            input_dims: [4, 4],
            ..small_params()
        };
        assert!(matches!(
            params.validate(),
            Err(NetworkError::InvalidArchitecture(_))
        ));
    }

    #[test]
    fn body_concatenates_extra_inputs() {
        let device = Default::default();
        let body =
            ModelBody::<Backend>::new(&small_params(), 4, 2, true, 2, &device).expect("body");
        let action = Tensor::zeros([3, 2], &device);
        let out = body.forward(&inputs(3, 4), Some(action));
        assert_eq!(out.dims(), [3, 16]);
        assert_eq!(body.output_size(), 16);
    }

    #[test]
    fn output_layer_record_keeps_activation() {
        let device = Default::default();
        let layer = OutputLayer::<Backend>::new(4, 3, Activation::Tanh, &device);
        let fresh = OutputLayer::<Backend>::new(4, 3, Activation::Tanh, &device);
        let loaded = fresh.load_record(layer.clone().into_record());
        let x = Tensor::<Backend, 2>::ones([2, 4], &device).mul_scalar(50.0);
        let expected: Vec<f32> = layer.forward(x.clone()).into_data().to_vec().unwrap();
        let actual: Vec<f32> = loaded.forward(x).into_data().to_vec().unwrap();
        assert_eq!(expected, actual);
        assert!(actual.iter().all(|v| v.abs() <= 1.0));
        assert_eq!(Activation::Gelu.to_string(), "gelu");
    }

    #[test]
    fn body_supports_batch_norm_and_avg_pooling() {
        let device = Default::default();
        let params = NetworkParams {
            pooling: Pooling::Avg,
            batch_norm: true,
            dropout: 0.1,
            ..small_params()
        };
        let body = ModelBody::<Backend>::new(&params, 4, 2, false, 0, &device).expect("body");
        let out = body.forward(&inputs(2, 4), None);
        assert_eq!(out.dims(), [2, 16]);
    }
}
