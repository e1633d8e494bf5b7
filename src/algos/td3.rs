use burn::module::{AutodiffModule, Module};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, LearningRate, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Distribution, Tensor};
use rand::Rng;
use rand_distr::StandardNormal;

use super::{
    Algorithm, AgentState, OffPolicyAgent, RlParams, TransitionBatch, UpdateMetrics,
    bellman_backup,
};
use crate::checkpoint::{decode_record, encode_record};
use crate::env::{Observation, ObservationSpec};
use crate::error::{CheckpointError, NetworkError};
use crate::ml::{
    DeterministicPolicy, NetworkParams, ObservationEncoder, TwinCritic, count_vars, hard_copy,
    soft_update, tensor_mean, tensor_values,
};

type ActorOptimizer<B> = OptimizerAdaptor<Adam, DeterministicPolicy<B>, B>;
type CriticOptimizer<B> = OptimizerAdaptor<Adam, TwinCritic<B>, B>;

/// Twin Delayed DDPG.
pub struct Td3Agent<B: AutodiffBackend> {
    actor: DeterministicPolicy<B>,
    critic: TwinCritic<B>,
    target_actor: DeterministicPolicy<B>,
    target_critic: TwinCritic<B>,
    actor_optimizer: ActorOptimizer<B>,
    critic_optimizer: CriticOptimizer<B>,
    pi_lr: LearningRate,
    q_lr: LearningRate,
    params: RlParams,
    spec: ObservationSpec,
    device: B::Device,
    updates: usize,
}

impl<B: AutodiffBackend> Td3Agent<B> {
    pub fn new(
        params: &RlParams,
        network: &NetworkParams,
        spec: ObservationSpec,
        device: &B::Device,
    ) -> Result<Self, NetworkError> {
        let actor = DeterministicPolicy::new(network, &spec, params.use_prev_action, device)?;
        let critic = TwinCritic::new(network, &spec, params.use_prev_action, device)?;
        Ok(Self {
            target_actor: hard_copy(&actor),
            target_critic: hard_copy(&critic),
            actor,
            critic,
            actor_optimizer: AdamConfig::new().init(),
            critic_optimizer: AdamConfig::new().init(),
            pi_lr: params.pi_lr,
            q_lr: params.q_lr,
            params: params.clone(),
            spec,
            device: device.clone(),
            updates: 0,
        })
    }

    pub fn actor(&self) -> &DeterministicPolicy<B> {
        &self.actor
    }

    pub fn critic(&self) -> &TwinCritic<B> {
        &self.critic
    }

    pub fn target_actor(&self) -> &DeterministicPolicy<B> {
        &self.target_actor
    }

    pub fn target_critic(&self) -> &TwinCritic<B> {
        &self.target_critic
    }

    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl<B: AutodiffBackend> OffPolicyAgent for Td3Agent<B> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Td3
    }

    fn act<R: Rng>(&self, observation: &Observation, deterministic: bool, rng: &mut R) -> Vec<f32> {
        let inputs =
            ObservationEncoder::encode_tensor::<B::InnerBackend>(observation, &self.spec, &self.device);
        let mut action = tensor_values(self.actor.clone().valid().forward(&inputs));
        if !deterministic {
            let scale = self.spec.action_scale;
            let sigma = self.params.act_noise * scale;
            for value in &mut action {
                let noise: f32 = rng.sample(StandardNormal);
                *value = (*value + sigma * noise).clamp(-scale, scale);
            }
        }
        action
    }

    fn update(&mut self, batch: &TransitionBatch) -> UpdateMetrics {
        let n = batch.size;
        let spec = &self.spec;
        let scale = spec.action_scale;
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

        // Target policy smoothing.
        let clip = self.params.noise_clip * scale;
        let noise = Tensor::<B, 2>::random(
            [n, spec.action_dim],
            Distribution::Normal(0.0, (self.params.target_noise * scale) as f64),
            &self.device,
        )
        .clamp(-clip, clip);
        let next_action = (self.target_actor.forward(&next_obs) + noise).clamp(-scale, scale);
        let min_q_targ = self.target_critic.min_q(&next_obs, next_action);
        let backup = bellman_backup(rewards, dones, min_q_targ, self.params.gamma);

        let (q1, q2) = self.critic.forward(&obs, actions);
        let loss_q1 = (q1.clone() - backup.clone()).powf_scalar(2.0).mean();
        let loss_q2 = (q2.clone() - backup).powf_scalar(2.0).mean();
        let loss_q = loss_q1 + loss_q2;
        let mut metrics = UpdateMetrics {
            loss_q: tensor_mean(loss_q.clone().detach()),
            q1: tensor_mean(q1.detach()),
            q2: tensor_mean(q2.detach()),
            ..UpdateMetrics::default()
        };
        let grads = GradientsParams::from_grads(loss_q.backward(), &self.critic);
        let critic = self.critic.clone();
        self.critic = self.critic_optimizer.step(self.q_lr, critic, grads);

        if self.updates % self.params.policy_delay == 0 {
            let pi = self.actor.forward(&obs);
            let loss_pi = self.critic.q1(&obs, pi).mean().neg();
            metrics.loss_pi = Some(tensor_mean(loss_pi.clone().detach()));
            let grads = GradientsParams::from_grads(loss_pi.backward(), &self.actor);
            let actor = self.actor.clone();
            self.actor = self.actor_optimizer.step(self.pi_lr, actor, grads);

            let tau = self.params.tau();
            self.target_actor = soft_update(&self.actor, self.target_actor.clone(), tau);
            self.target_critic = soft_update(&self.critic, self.target_critic.clone(), tau);
        }
        self.updates += 1;
        metrics
    }

    fn parameter_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("pi", count_vars::<B, _>(&self.actor)),
            ("q1+q2", count_vars::<B, _>(&self.critic)),
        ]
    }

    fn save_state(&self) -> Result<AgentState, CheckpointError> {
        Ok(AgentState {
            algorithm: Algorithm::Td3,
            actor: encode_record::<B, _>(self.actor.clone().into_record())?,
            critic: encode_record::<B, _>(self.critic.clone().into_record())?,
            target_actor: Some(encode_record::<B, _>(self.target_actor.clone().into_record())?),
            target_critic: encode_record::<B, _>(self.target_critic.clone().into_record())?,
            actor_optimizer: encode_record::<B, _>(self.actor_optimizer.to_record())?,
            critic_optimizer: encode_record::<B, _>(self.critic_optimizer.to_record())?,
            updates: self.updates,
            log_alpha: None,
        })
    }

    fn load_state(&mut self, state: AgentState) -> Result<(), CheckpointError> {
        if state.algorithm != Algorithm::Td3 {
            return Err(CheckpointError::AlgorithmMismatch {
                expected: Algorithm::Td3.name(),
                found: state.algorithm.name().to_string(),
            });
        }
        let target_actor = state
            .target_actor
            .ok_or(CheckpointError::MissingState("target_actor"))?;
        let device = &self.device;
        self.actor = self.actor.clone().load_record(decode_record::<B, _>(state.actor, device)?);
        self.critic = self.critic.clone().load_record(decode_record::<B, _>(state.critic, device)?);
        self.target_actor = self
            .target_actor
            .clone()
            .load_record(decode_record::<B, _>(target_actor, device)?);
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
        self.updates = state.updates;
        Ok(())
    }
}
