pub mod critic;
pub mod distributions;
pub mod encoding;
pub mod network;
pub mod policy;
pub mod target;

pub use critic::{QNetwork, TwinCritic};
pub use distributions::{
    LOG_STD_MAX, LOG_STD_MIN, apply_squashing, clip_but_pass_gradient, gaussian_likelihood,
};
pub use encoding::{ObservationEncoder, tensor_mean, tensor_values};
pub use network::{Activation, BodyInputs, ModelBody, NetworkParams, Pooling};
pub use policy::{DeterministicPolicy, GaussianPolicy, PolicyOutput, count_vars};
pub use target::{hard_copy, soft_update};
