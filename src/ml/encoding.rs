use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use super::network::BodyInputs;
use crate::env::{Observation, ObservationSpec};

/// Turns observations into network input tensors.
pub struct ObservationEncoder;

impl ObservationEncoder {
    /// Batch of one, used when acting.
    pub fn encode_tensor<B: Backend>(
        observation: &Observation,
        spec: &ObservationSpec,
        device: &B::Device,
    ) -> BodyInputs<B> {
        Self::encode_parts(
            observation.tactile.clone(),
            observation.goal.clone(),
            observation.prev_action.clone(),
            1,
            spec,
            device,
        )
    }

    /// Builds inputs from flat row-major buffers holding `batch` rows each.
    pub fn encode_parts<B: Backend>(
        tactile: Vec<f32>,
        goal: Vec<f32>,
        prev_action: Vec<f32>,
        batch: usize,
        spec: &ObservationSpec,
        device: &B::Device,
    ) -> BodyInputs<B> {
        let [height, width] = spec.image_dims;
        BodyInputs {
            tactile: Tensor::from_data(TensorData::new(tactile, [batch, 1, height, width]), device),
            goal: Tensor::from_data(TensorData::new(goal, [batch, spec.goal_dim]), device),
            prev_action: Tensor::from_data(
                TensorData::new(prev_action, [batch, spec.action_dim]),
                device,
            ),
        }
    }

    pub fn vector_tensor<B: Backend>(values: Vec<f32>, device: &B::Device) -> Tensor<B, 1> {
        let len = values.len();
        Tensor::from_data(TensorData::new(values, [len]), device)
    }

    pub fn matrix_tensor<B: Backend>(
        values: Vec<f32>,
        rows: usize,
        columns: usize,
        device: &B::Device,
    ) -> Tensor<B, 2> {
        Tensor::from_data(TensorData::new(values, [rows, columns]), device)
    }
}

/// Copies a tensor back to host memory, converting from the backend's
/// float type.
pub fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    let data = tensor.into_data();
    data.iter::<f32>().collect()
}

/// Mean of a tensor as a host scalar.
pub fn tensor_mean<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f32 {
    tensor_values(tensor.mean()).pop().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn encoder_outputs_expected_shapes() {
        let spec = ObservationSpec {
            image_dims: [3, 4],
            goal_dim: 5,
            action_dim: 2,
            action_scale: 1.0,
        };
        let observation = Observation {
            tactile: vec![0.5; 12],
            goal: vec![0.0, 1.0, 0.0, 0.0, 0.0],
            prev_action: vec![0.1, -0.1],
        };
        let device = Default::default();
        let inputs = ObservationEncoder::encode_tensor::<Backend>(&observation, &spec, &device);
        assert_eq!(inputs.tactile.dims(), [1, 1, 3, 4]);
        assert_eq!(inputs.goal.dims(), [1, 5]);
        assert_eq!(tensor_values(inputs.prev_action), vec![0.1, -0.1]);
    }

    #[test]
    fn values_are_read_from_double_precision_backends() {
        let device = Default::default();
        let tensor = Tensor::<NdArray<f64>, 2>::from_floats([[1.5, -0.25], [2.0, 0.0]], &device);
        assert_eq!(tensor_values(tensor), vec![1.5, -0.25, 2.0, 0.0]);
        let scalar = Tensor::<NdArray<f64>, 1>::from_floats([1.0, 2.0], &device);
        assert!((tensor_mean(scalar) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn mean_of_tensor() {
        let device = Default::default();
        let tensor = ObservationEncoder::vector_tensor::<Backend>(vec![1.0, 2.0, 3.0], &device);
        assert!((tensor_mean(tensor) - 2.0).abs() < 1e-6);
    }
}
