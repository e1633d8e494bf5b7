//! Off-policy actor-critic algorithms and the loop that trains them.

pub mod replay_buffer;
pub mod runner;
pub mod sac;
pub mod td3;

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::env::Observation;
use crate::error::{CheckpointError, ConfigError};

pub use replay_buffer::{ReplayBuffer, Transition, TransitionBatch};
pub use runner::{ResumeParams, RunConfig, TrainOutcome, Trainer, run_experiment};
pub use sac::SacAgent;
pub use td3::Td3Agent;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Algorithm {
    Td3,
    Sac,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Td3 => "td3",
            Algorithm::Sac => "sac",
        }
    }
}

/// Hyper-parameters of the training loop and both algorithms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RlParams {
    pub seed: u64,
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub replay_size: usize,
    pub gamma: f32,
    /// Target ← polyak · target + (1 − polyak) · online.
    pub polyak: f32,
    pub pi_lr: f64,
    pub q_lr: f64,
    pub batch_size: usize,
    pub start_steps: usize,
    pub update_after: usize,
    pub update_every: usize,
    pub max_ep_len: usize,
    pub num_test_episodes: usize,
    pub save_freq: usize,
    pub save_replay_buffer: bool,
    pub use_prev_action: bool,
    // TD3
    pub act_noise: f32,
    pub target_noise: f32,
    pub noise_clip: f32,
    pub policy_delay: usize,
    // SAC
    pub alpha: f32,
    pub auto_alpha: bool,
    pub alpha_lr: f32,
    pub target_entropy: Option<f32>,
}

impl Default for RlParams {
    fn default() -> Self {
        Self {
            seed: 0,
            epochs: 50,
            steps_per_epoch: 1_000,
            replay_size: 10_000,
            gamma: 0.95,
            polyak: 0.995,
            pi_lr: 1e-3,
            q_lr: 1e-3,
            batch_size: 64,
            start_steps: 1_000,
            update_after: 500,
            update_every: 50,
            max_ep_len: 25,
            num_test_episodes: 10,
            save_freq: 1,
            save_replay_buffer: true,
            use_prev_action: true,
            act_noise: 0.1,
            target_noise: 0.2,
            noise_clip: 0.5,
            policy_delay: 2,
            alpha: 0.2,
            auto_alpha: false,
            alpha_lr: 1e-3,
            target_entropy: None,
        }
    }
}

impl RlParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Validation(msg.into()));
        if self.epochs == 0 {
            return fail("epochs must be > 0");
        }
        if self.steps_per_epoch == 0 {
            return fail("steps_per_epoch must be > 0");
        }
        if self.batch_size == 0 {
            return fail("batch_size must be > 0");
        }
        if self.replay_size < self.batch_size {
            return fail("replay_size must be >= batch_size");
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return fail("gamma must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.polyak) {
            return fail("polyak must be in [0, 1]");
        }
        if self.pi_lr <= 0.0 || self.q_lr <= 0.0 {
            return fail("learning rates must be > 0");
        }
        if self.update_every == 0 {
            return fail("update_every must be > 0");
        }
        if self.max_ep_len == 0 {
            return fail("max_ep_len must be > 0");
        }
        if self.save_freq == 0 {
            return fail("save_freq must be > 0");
        }
        if self.policy_delay == 0 {
            return fail("policy_delay must be > 0");
        }
        if self.act_noise < 0.0 || self.target_noise < 0.0 || self.noise_clip < 0.0 {
            return fail("noise scales must be >= 0");
        }
        if self.alpha <= 0.0 {
            return fail("alpha must be > 0");
        }
        if self.auto_alpha && self.alpha_lr <= 0.0 {
            return fail("alpha_lr must be > 0 when auto_alpha is set");
        }
        Ok(())
    }

    /// Interpolation factor handed to [`crate::ml::soft_update`].
    pub fn tau(&self) -> f32 {
        1.0 - self.polyak
    }

    pub fn total_steps(&self) -> usize {
        self.epochs * self.steps_per_epoch
    }
}

/// Diagnostics from one gradient update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateMetrics {
    pub loss_q: f32,
    pub q1: f32,
    pub q2: f32,
    pub loss_pi: Option<f32>,
    pub logp_pi: Option<f32>,
    pub alpha: Option<f32>,
}

/// Detached Bellman target `r + γ (1 − d) · next_value`.
pub(crate) fn bellman_backup<B: Backend>(
    rewards: Tensor<B, 1>,
    dones: Tensor<B, 1>,
    next_value: Tensor<B, 1>,
    gamma: f32,
) -> Tensor<B, 1> {
    (rewards + dones.neg().add_scalar(1.0).mul_scalar(gamma) * next_value).detach()
}

/// Serialized networks, targets and optimizer state of an agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentState {
    pub algorithm: Algorithm,
    pub actor: Vec<u8>,
    pub critic: Vec<u8>,
    pub target_actor: Option<Vec<u8>>,
    pub target_critic: Vec<u8>,
    pub actor_optimizer: Vec<u8>,
    pub critic_optimizer: Vec<u8>,
    pub updates: usize,
    pub log_alpha: Option<f32>,
}

/// Common surface of TD3 and SAC used by the trainer.
pub trait OffPolicyAgent {
    fn algorithm(&self) -> Algorithm;

    /// Action for a single observation; `deterministic` disables exploration.
    fn act<R: Rng>(&self, observation: &Observation, deterministic: bool, rng: &mut R) -> Vec<f32>;

    fn update(&mut self, batch: &TransitionBatch) -> UpdateMetrics;

    /// Trainable parameter counts per network, for the start-up summary.
    fn parameter_counts(&self) -> Vec<(&'static str, usize)>;

    fn save_state(&self) -> Result<AgentState, CheckpointError>;

    fn load_state(&mut self, state: AgentState) -> Result<(), CheckpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    fn host(values: &[f32]) -> Tensor<NdArray<f32>, 1> {
        let data = burn::tensor::TensorData::new(values.to_vec(), [values.len()]);
        Tensor::from_data(data, &Default::default())
    }

    fn assert_close(actual: Tensor<NdArray<f32>, 1>, expected: &[f32]) {
        let actual: Vec<f32> = actual.into_data().to_vec().unwrap();
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn backup_drops_bootstrap_on_terminal_transitions() {
        let backup = bellman_backup(
            host(&[1.0, -0.01, 0.5]),
            host(&[1.0, 0.0, 0.0]),
            host(&[2.0, 3.0, -1.0]),
            0.95,
        );
        assert_close(backup, &[1.0, -0.01 + 0.95 * 3.0, 0.5 - 0.95]);
    }

    #[test]
    fn default_params_are_valid() {
        RlParams::default().validate().expect("defaults");
    }

    #[test]
    fn tau_is_complement_of_polyak() {
        let params = RlParams {
            polyak: 0.99,
            ..RlParams::default()
        };
        assert!((params.tau() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cases: Vec<fn(&mut RlParams)> = vec![
            |p| p.epochs = 0,
            |p| p.batch_size = 0,
            |p| p.replay_size = 1,
            |p| p.gamma = 1.5,
            |p| p.polyak = -0.1,
            |p| p.q_lr = 0.0,
            |p| p.update_every = 0,
            |p| p.policy_delay = 0,
            |p| p.alpha = 0.0,
            |p| {
                p.auto_alpha = true;
                p.alpha_lr = 0.0;
            },
        ];
        for mutate in cases {
            let mut params = RlParams::default();
            mutate(&mut params);
            assert!(params.validate().is_err(), "{params:?} should be rejected");
        }
    }
}
