use std::f32::consts::PI;

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

pub const EPS: f32 = 1.0e-8;
pub const LOG_STD_MIN: f32 = -20.0;
pub const LOG_STD_MAX: f32 = 2.0;

/// Clips the forward value to `[low, high]` while letting the gradient
/// through as if no clipping happened.
pub fn clip_but_pass_gradient<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    low: f32,
    high: f32,
) -> Tensor<B, D> {
    let clip_up = x.clone().greater_elem(high).float();
    let clip_low = x.clone().lower_elem(low).float();
    let correction = x.clone().neg().add_scalar(high) * clip_up
        + x.clone().neg().add_scalar(low) * clip_low;
    x + correction.detach()
}

/// Log-density of `x` under a diagonal Gaussian, summed over the last axis.
pub fn gaussian_likelihood<B: Backend>(
    x: Tensor<B, 2>,
    mu: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch, _] = x.dims();
    let std = log_std.clone().exp().add_scalar(EPS);
    let z = (x - mu) / std;
    let pre_sum = (z.powf_scalar(2.0) + log_std.mul_scalar(2.0))
        .add_scalar((2.0 * PI).ln())
        .mul_scalar(-0.5);
    pre_sum.sum_dim(1).reshape([batch])
}

/// Maps an unbounded head output to `[LOG_STD_MIN, LOG_STD_MAX]`.
pub fn scale_log_std<B: Backend>(raw: Tensor<B, 2>) -> Tensor<B, 2> {
    let half_range = 0.5 * (LOG_STD_MAX - LOG_STD_MIN);
    raw.tanh().add_scalar(1.0).mul_scalar(half_range).add_scalar(LOG_STD_MIN)
}

/// Tanh squashing with the matching log-probability correction.
pub fn apply_squashing<B: Backend>(
    mu: Tensor<B, 2>,
    pi: Tensor<B, 2>,
    logp_pi: Tensor<B, 1>,
) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 1>) {
    let [batch, _] = pi.dims();
    let mu = mu.tanh();
    let pi = pi.tanh();
    let one_minus_sq = pi.clone().powf_scalar(2.0).neg().add_scalar(1.0);
    let correction = clip_but_pass_gradient(one_minus_sq, 0.0, 1.0)
        .add_scalar(1.0e-6)
        .log()
        .sum_dim(1)
        .reshape([batch]);
    (mu, pi, logp_pi - correction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;
    type Diff = Autodiff<NdArray<f32>>;

    fn values<const D: usize>(tensor: Tensor<Backend, D>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().expect("f32 data")
    }

    #[test]
    fn clip_clamps_forward_values() {
        let device = Default::default();
        let x = Tensor::<Backend, 1>::from_floats([-2.0, 0.5, 3.0], &device);
        assert_eq!(values(clip_but_pass_gradient(x, -1.0, 1.0)), vec![-1.0, 0.5, 1.0]);
    }

    #[test]
    fn clip_passes_gradient_through() {
        let device = Default::default();
        let x = Tensor::<Diff, 1>::from_floats([-2.0, 0.5, 3.0], &device).require_grad();
        let y = clip_but_pass_gradient(x.clone(), -1.0, 1.0).sum();
        let grads = y.backward();
        let grad = x.grad(&grads).expect("gradient");
        assert_eq!(grad.into_data().to_vec::<f32>().unwrap(), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn standard_normal_density_at_mean() {
        let device = Default::default();
        let zeros = Tensor::<Backend, 2>::zeros([1, 2], &device);
        let logp = values(gaussian_likelihood(zeros.clone(), zeros.clone(), zeros));
        let expected = -(2.0 * PI).ln();
        assert!((logp[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn log_std_stays_in_bounds() {
        let device = Default::default();
        let raw = Tensor::<Backend, 2>::from_data(
            TensorData::new(vec![-100.0f32, 0.0, 100.0], [3, 1]),
            &device,
        );
        let scaled = values(scale_log_std(raw));
        assert!((scaled[0] - LOG_STD_MIN).abs() < 1e-4);
        assert!((scaled[1] - 0.5 * (LOG_STD_MIN + LOG_STD_MAX)).abs() < 1e-4);
        assert!((scaled[2] - LOG_STD_MAX).abs() < 1e-4);
    }

    #[test]
    fn squashing_bounds_actions_and_lowers_nothing_at_zero() {
        let device = Default::default();
        let pi = Tensor::<Backend, 2>::from_floats([[0.0, 0.0], [5.0, -5.0]], &device);
        let logp = Tensor::<Backend, 1>::from_floats([1.0, 1.0], &device);
        let (_, squashed, corrected) = apply_squashing(pi.clone(), pi, logp);
        assert!(values(squashed).iter().all(|v| v.abs() <= 1.0));
        let corrected = values(corrected);
        // log(1 + 1e-6) is negligible when tanh'(0) = 1
        assert!((corrected[0] - 1.0).abs() < 1e-4);
        assert!(corrected[1] > corrected[0]);
    }
}
