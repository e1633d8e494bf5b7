use burn::module::{AutodiffModule, Module};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, LearningRate, Optimizer};
use burn::tensor::Tensor;
use burn::tensor::backend::{AutodiffBackend, Backend};
use rand::Rng;

use super::{
    Algorithm, AgentState, OffPolicyAgent, RlParams, TransitionBatch, UpdateMetrics,
    bellman_backup,
};
use crate::checkpoint::{decode_record, encode_record};
use crate::env::{Observation, ObservationSpec};
use crate::error::{CheckpointError, NetworkError};
use crate::ml::{
    GaussianPolicy, NetworkParams, ObservationEncoder, TwinCritic, count_vars, hard_copy,
    soft_update, tensor_mean, tensor_values,
};

type ActorOptimizer<B> = OptimizerAdaptor<Adam, GaussianPolicy<B>, B>;
type CriticOptimizer<B> = OptimizerAdaptor<Adam, TwinCritic<B>, B>;

/// Soft Actor-Critic with a squashed Gaussian policy.
///
/// The temperature is kept as `log α` so it stays positive. With
/// `auto_alpha` it follows
/// `log α ← log α + lr · (mean(logp_pi) + target_entropy)`,
/// the gradient step on `-log α · (logp_pi + target_entropy)`.
pub struct SacAgent<B: AutodiffBackend> {
    actor: GaussianPolicy<B>,
    critic: TwinCritic<B>,
    target_critic: TwinCritic<B>,
    actor_optimizer: ActorOptimizer<B>,
    critic_optimizer: CriticOptimizer<B>,
    pi_lr: LearningRate,
    q_lr: LearningRate,
    log_alpha: f32,
    target_entropy: f32,
    params: RlParams,
    spec: ObservationSpec,
    device: B::Device,
    updates: usize,
}

impl<B: AutodiffBackend> SacAgent<B> {
    pub fn new(
        params: &RlParams,
        network: &NetworkParams,
        spec: ObservationSpec,
        device: &B::Device,
    ) -> Result<Self, NetworkError> {
        let actor = GaussianPolicy::new(network, &spec, params.use_prev_action, device)?;
        let critic = TwinCritic::new(network, &spec, params.use_prev_action, device)?;
        Ok(Self {
            target_critic: hard_copy(&critic),
            actor,
            critic,
            actor_optimizer: AdamConfig::new().init(),
            critic_optimizer: AdamConfig::new().init(),
            pi_lr: params.pi_lr,
            q_lr: params.q_lr,
            log_alpha: params.alpha.ln(),
            target_entropy: params
                .target_entropy
                .unwrap_or(-(spec.action_dim as f32)),
            params: params.clone(),
            spec,
            device: device.clone(),
            updates: 0,
        })
    }

    pub fn alpha(&self) -> f32 {
        self.log_alpha.exp()
    }

    pub fn target_entropy(&self) -> f32 {
        self.target_entropy
    }

    pub fn actor(&self) -> &GaussianPolicy<B> {
        &self.actor
    }

    pub fn critic(&self) -> &TwinCritic<B> {
        &self.critic
    }

    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl<B: AutodiffBackend> OffPolicyAgent for SacAgent<B> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Sac
    }

    /// Exploration noise comes from the policy itself, so `rng` is unused.
    fn act<R: Rng>(&self, observation: &Observation, deterministic: bool, _rng: &mut R) -> Vec<f32> {
        let inputs =
            ObservationEncoder::encode_tensor::<B::InnerBackend>(observation, &self.spec, &self.device);
        let output = self.actor.clone().valid().forward(&inputs);
        if deterministic {
            tensor_values(output.mu)
        } else {
            tensor_values(output.pi)
        }
    }

    fn update(&mut self, batch: &TransitionBatch) -> UpdateMetrics {
        let n = batch.size;
        let spec = &self.spec;
        let alpha = self.alpha();
        let obs = ObservationEncoder::encode_parts::<B>(
            batch.tactile.clone(),
            batch.goals.clone(),
            batch.prev_actions.clone(),
            n,
            spec,
            &self.device,
        );
        let next_obs = ObservationEncoder::encode_parts::<B>(
            batch.next_tactile.clone(),
            batch.goals.clone(),
            batch.actions.clone(),
            n,
            spec,
            &self.device,
        );
        let actions = ObservationEncoder::matrix_tensor::<B>(
            batch.actions.clone(),
            n,
            spec.action_dim,
            &self.device,
        );
        let rewards = ObservationEncoder::vector_tensor::<B>(batch.rewards.clone(), &self.device);
        let dones = ObservationEncoder::vector_tensor::<B>(batch.dones.clone(), &self.device);

        let next = self.actor.forward(&next_obs);
        let next_pi = next.pi.detach();
        let next_logp = next.logp_pi.detach();
        let min_q_targ = self.target_critic.min_q(&next_obs, next_pi);
        let soft_value = soft_value(min_q_targ, next_logp, alpha);
        let backup = bellman_backup(rewards, dones, soft_value, self.params.gamma);

        let (q1, q2) = self.critic.forward(&obs, actions);
        let loss_q1 = (q1.clone() - backup.clone()).powf_scalar(2.0).mean();
        let loss_q2 = (q2.clone() - backup).powf_scalar(2.0).mean();
        let loss_q = loss_q1 + loss_q2;
        let loss_q_value = tensor_mean(loss_q.clone().detach());
        let grads = GradientsParams::from_grads(loss_q.backward(), &self.critic);
        let critic = self.critic.clone();
        self.critic = self.critic_optimizer.step(self.q_lr, critic, grads);

        let current = self.actor.forward(&obs);
        let logp_pi = current.logp_pi;
        let min_q_pi = self.critic.min_q(&obs, current.pi);
        let loss_pi = (logp_pi.clone().mul_scalar(alpha) - min_q_pi).mean();
        let loss_pi_value = tensor_mean(loss_pi.clone().detach());
        let mean_logp = tensor_mean(logp_pi.detach());
        let grads = GradientsParams::from_grads(loss_pi.backward(), &self.actor);
        let actor = self.actor.clone();
        self.actor = self.actor_optimizer.step(self.pi_lr, actor, grads);

        if self.params.auto_alpha {
            self.log_alpha += self.params.alpha_lr * (mean_logp + self.target_entropy);
        }

        self.target_critic =
            soft_update(&self.critic, self.target_critic.clone(), self.params.tau());
        self.updates += 1;

        UpdateMetrics {
            loss_q: loss_q_value,
            q1: tensor_mean(q1.detach()),
            q2: tensor_mean(q2.detach()),
            loss_pi: Some(loss_pi_value),
            logp_pi: Some(mean_logp),
            alpha: Some(self.alpha()),
        }
    }

    fn parameter_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("pi", count_vars::<B, _>(&self.actor)),
            ("q1+q2", count_vars::<B, _>(&self.critic)),
        ]
    }

    fn save_state(&self) -> Result<AgentState, CheckpointError> {
        Ok(AgentState {
            algorithm: Algorithm::Sac,
            actor: encode_record::<B, _>(self.actor.clone().into_record())?,
            critic: encode_record::<B, _>(self.critic.clone().into_record())?,
            target_actor: None,
            target_critic: encode_record::<B, _>(self.target_critic.clone().into_record())?,
            actor_optimizer: encode_record::<B, _>(self.actor_optimizer.to_record())?,
            critic_optimizer: encode_record::<B, _>(self.critic_optimizer.to_record())?,
            updates: self.updates,
            log_alpha: Some(self.log_alpha),
        })
    }

    fn load_state(&mut self, state: AgentState) -> Result<(), CheckpointError> {
        if state.algorithm != Algorithm::Sac {
            return Err(CheckpointError::AlgorithmMismatch {
                expected: Algorithm::Sac.name(),
                found: state.algorithm.name().to_string(),
            });
        }
        let log_alpha = state.log_alpha.ok_or(CheckpointError::MissingState("log_alpha"))?;
        let device = &self.device;
        self.actor = self.actor.clone().load_record(decode_record::<B, _>(state.actor, device)?);
        self.critic = self.critic.clone().load_record(decode_record::<B, _>(state.critic, device)?);
        self.target_critic = self
            .target_critic
            .clone()
            .load_record(decode_record::<B, _>(state.target_critic, device)?);
        let actor_optimizer = std::mem::replace(&mut self.actor_optimizer, AdamConfig::new().init());
        self.actor_optimizer =
            actor_optimizer.load_record(decode_record::<B, _>(state.actor_optimizer, device)?);
        let critic_optimizer =
            std::mem::replace(&mut self.critic_optimizer, AdamConfig::new().init());
        self.critic_optimizer =
            critic_optimizer.load_record(decode_record::<B, _>(state.critic_optimizer, device)?);
        self.log_alpha = log_alpha;
        self.updates = state.updates;
        Ok(())
    }
}

/// `min Q_targ(s', a') − α · log π(a'|s')`.
fn soft_value<B: Backend>(
    min_q_targ: Tensor<B, 1>,
    next_logp: Tensor<B, 1>,
    alpha: f32,
) -> Tensor<B, 1> {
    min_q_targ - next_logp.mul_scalar(alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algos::{ReplayBuffer, Transition};
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type Backend = Autodiff<NdArray<f32>>;

    #[test]
    fn soft_backup_subtracts_entropy_term() {
        let device = Default::default();
        let host = |values: [f32; 2]| Tensor::<NdArray<f32>, 1>::from_floats(values, &device);
        let value = soft_value(host([2.0, 3.0]), host([-1.0, 0.5]), 0.2);
        let backup = bellman_backup(host([0.0, -0.01]), host([0.0, 1.0]), value, 0.9);
        let backup = tensor_values(backup);
        // 0.9 * (2 + 0.2), and the terminal row keeps only its reward
        assert!((backup[0] - 1.98).abs() < 1e-5);
        assert!((backup[1] + 0.01).abs() < 1e-6);
    }

    fn spec() -> ObservationSpec {
        ObservationSpec {
            image_dims: [8, 8],
            goal_dim: 4,
            action_dim: 2,
            action_scale: 1.0,
        }
    }

    fn network() -> NetworkParams {
        NetworkParams {
            input_dims: [8, 8],
            conv_filters: vec![2],
            dense_units: vec![8],
            pooling_strides: 1,
            ..NetworkParams::default()
        }
    }

    fn observation() -> Observation {
        Observation {
            tactile: vec![0.3; 64],
            goal: vec![1.0, 0.0, 0.0, 0.0],
            prev_action: vec![0.0, 0.0],
        }
    }

    fn batch() -> TransitionBatch {
        let mut buffer = ReplayBuffer::new(&spec(), 8);
        let obs = observation();
        for i in 0..8 {
            buffer
                .store(Transition {
                    observation: &obs,
                    action: &[0.2, 0.1],
                    reward: i as f32 * 0.1,
                    next_tactile: &[0.5; 64],
                    done: i == 7,
                })
                .expect("store");
        }
        buffer.sample_batch(4, &mut StdRng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn default_target_entropy_is_negative_action_dim() {
        let device = Default::default();
        let agent =
            SacAgent::<Backend>::new(&RlParams::default(), &network(), spec(), &device).unwrap();
        assert_eq!(agent.target_entropy(), -2.0);
        assert!((agent.alpha() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn update_reports_all_metrics() {
        let device = Default::default();
        let mut agent =
            SacAgent::<Backend>::new(&RlParams::default(), &network(), spec(), &device).unwrap();
        let metrics = agent.update(&batch());
        assert!(metrics.loss_q.is_finite());
        assert!(metrics.loss_pi.is_some_and(f32::is_finite));
        assert!(metrics.logp_pi.is_some_and(f32::is_finite));
        assert_eq!(metrics.alpha, Some(agent.alpha()));
        assert_eq!(agent.updates(), 1);
    }

    #[test]
    fn fixed_alpha_stays_fixed() {
        let device = Default::default();
        let mut agent =
            SacAgent::<Backend>::new(&RlParams::default(), &network(), spec(), &device).unwrap();
        agent.update(&batch());
        agent.update(&batch());
        assert!((agent.alpha() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn auto_alpha_moves_towards_target_entropy() {
        let device = Default::default();
        let params = RlParams {
            auto_alpha: true,
            alpha_lr: 0.1,
            ..RlParams::default()
        };
        let mut agent = SacAgent::<Backend>::new(&params, &network(), spec(), &device).unwrap();
        let before = agent.alpha();
        let metrics = agent.update(&batch());
        let logp = metrics.logp_pi.expect("logp");
        let expected = (before.ln() + 0.1 * (logp + agent.target_entropy())).exp();
        assert!((agent.alpha() - expected).abs() < 1e-5);
    }

    #[test]
    fn deterministic_action_is_repeatable_and_bounded() {
        let device = Default::default();
        let agent =
            SacAgent::<Backend>::new(&RlParams::default(), &network(), spec(), &device).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let a = agent.act(&observation(), true, &mut rng);
        let b = agent.act(&observation(), true, &mut rng);
        assert_eq!(a, b);
        let sampled = agent.act(&observation(), false, &mut rng);
        assert!(sampled.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn state_restores_alpha_and_weights() {
        let device = Default::default();
        let params = RlParams {
            auto_alpha: true,
            ..RlParams::default()
        };
        let mut agent = SacAgent::<Backend>::new(&params, &network(), spec(), &device).unwrap();
        agent.update(&batch());
        let state = agent.save_state().expect("save");
        assert!(state.target_actor.is_none());

        let mut restored = SacAgent::<Backend>::new(&params, &network(), spec(), &device).unwrap();
        restored.load_state(state).expect("load");
        assert_eq!(restored.alpha(), agent.alpha());
        assert_eq!(restored.updates(), 1);
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(
            agent.act(&observation(), true, &mut rng),
            restored.act(&observation(), true, &mut rng)
        );
    }
}
