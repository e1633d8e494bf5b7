use std::path::PathBuf;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{
    Algorithm, OffPolicyAgent, ReplayBuffer, RlParams, SacAgent, Td3Agent, Transition,
};
use crate::checkpoint::{
    CheckpointMetadata, ResumeState, SavedModel, TrainingCheckpoint, save_checkpoint,
    save_replay_buffer,
};
use crate::env::{EnvBuilder, EnvConfig, Environment, ObservationSpec, SimBrailleEnv};
use crate::error::{ConfigError, TrainError};
use crate::logger::{EpochLogger, LoggerConfig, Stats, save_config_text};
use crate::ml::NetworkParams;

const TEST_SEED_OFFSET: u64 = 10_000;

/// Configuration shared by fresh and resumed runs.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub rl: RlParams,
    pub network: NetworkParams,
    pub env: EnvConfig,
    pub logger: LoggerConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), TrainError> {
        self.rl.validate()?;
        self.network.validate()?;
        self.env.validate()?;
        if self.network.input_dims != self.env.image_size {
            return Err(ConfigError::Validation(format!(
                "network input {:?} does not match tactile image {:?}",
                self.network.input_dims, self.env.image_size
            ))
            .into());
        }
        Ok(())
    }
}

/// What a resumed run restores from its saved model.
pub struct ResumeParams {
    pub saved: SavedModel,
    pub additional_epochs: usize,
}

#[derive(Clone, Debug)]
pub struct TrainOutcome {
    pub epoch: usize,
    pub total_steps: usize,
    pub updates: usize,
    pub output_dir: PathBuf,
    /// Last progress row, in column order.
    pub last_row: Vec<(String, f64)>,
}

impl TrainOutcome {
    pub fn value(&self, key: &str) -> Option<f64> {
        self.last_row
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| *value)
    }
}

struct LoopStart {
    epoch: usize,
    total_steps: usize,
    end_steps: usize,
    elapsed_secs: f64,
}

/// Runs the interaction, update, test and checkpoint cycle for one agent.
pub struct Trainer<A: OffPolicyAgent> {
    agent: A,
    config: RunConfig,
    env: SimBrailleEnv,
    test_env: SimBrailleEnv,
    spec: ObservationSpec,
    buffer: ReplayBuffer,
    rng: StdRng,
}

impl<A: OffPolicyAgent> Trainer<A> {
    pub fn new(agent: A, config: RunConfig) -> Result<Self, TrainError> {
        config.validate()?;
        let seed = config.rl.seed;
        let env = EnvBuilder::from_config(config.env.clone())
            .with_seed(seed)
            .build()?;
        let test_env = EnvBuilder::from_config(config.env.clone())
            .with_seed(seed.wrapping_add(TEST_SEED_OFFSET))
            .build()?;
        let spec = env.spec();
        Ok(Self {
            buffer: ReplayBuffer::new(&spec, config.rl.replay_size),
            rng: StdRng::seed_from_u64(seed),
            agent,
            config,
            env,
            test_env,
            spec,
        })
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn into_agent(self) -> A {
        self.agent
    }

    /// Train for `rl.epochs` epochs from scratch.
    pub fn run(&mut self) -> Result<TrainOutcome, TrainError> {
        save_config_text(&self.config.logger.output_dir, &format!("{:#?}", self.config))?;
        let start = LoopStart {
            epoch: 0,
            total_steps: 0,
            end_steps: self.config.rl.total_steps(),
            elapsed_secs: 0.0,
        };
        self.train_loop(start)
    }

    /// Restore agent, optimizers and buffer, then train `additional_epochs`
    /// more epochs.
    pub fn resume(&mut self, resume: ResumeParams) -> Result<TrainOutcome, TrainError> {
        let SavedModel {
            checkpoint,
            replay_buffer,
        } = resume.saved;
        let state = checkpoint.resume;
        self.agent.load_state(checkpoint.agent)?;
        match replay_buffer {
            Some(buffer) if buffer.matches(&self.spec) => {
                println!("Restored replay buffer with {} transitions", buffer.len());
                self.buffer = buffer;
            }
            Some(_) => println!("Saved replay buffer does not match the environment, starting empty"),
            None => println!("No saved replay buffer, starting empty"),
        }

        // StdRng state is not persisted, so continue from a fresh stream
        // derived from the step count.
        let seed = self.config.rl.seed ^ state.total_steps as u64;
        self.env = EnvBuilder::from_config(self.config.env.clone())
            .with_seed(seed)
            .build()?;
        self.rng = StdRng::seed_from_u64(seed);

        let start = LoopStart {
            epoch: state.epoch,
            total_steps: state.total_steps,
            end_steps: state.total_steps + resume.additional_epochs * self.config.rl.steps_per_epoch,
            elapsed_secs: state.elapsed_secs,
        };
        println!(
            "Resuming from epoch {} ({} steps) for {} more epochs",
            state.epoch, state.total_steps, resume.additional_epochs
        );
        self.train_loop(start)
    }

    fn train_loop(&mut self, start: LoopStart) -> Result<TrainOutcome, TrainError> {
        let rl = self.config.rl.clone();
        let algorithm = self.agent.algorithm();
        let mut logger = EpochLogger::new(self.config.logger.clone())?;
        logger.resume_from(start.epoch);

        let counts: Vec<String> = self
            .agent
            .parameter_counts()
            .iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect();
        println!("\nNumber of parameters: \t {}\n", counts.join(", \t "));

        let timer = Instant::now();
        let mut outcome = TrainOutcome {
            epoch: start.epoch,
            total_steps: start.total_steps,
            updates: 0,
            output_dir: self.config.logger.output_dir.clone(),
            last_row: Vec::new(),
        };
        let mut observation = self.env.reset();
        let mut ep_ret = 0.0f32;
        let mut ep_len = 0usize;

        for t in start.total_steps..start.end_steps {
            let action = if t >= rl.start_steps {
                self.agent.act(&observation, false, &mut self.rng)
            } else {
                self.env.sample_action()
            };
            let step = self.env.step(&action)?;
            ep_ret += step.reward;
            ep_len += 1;

            // Hitting the time horizon is not a terminal state.
            let done = if ep_len == rl.max_ep_len { false } else { step.done };
            self.buffer.store(Transition {
                observation: &observation,
                action: &action,
                reward: step.reward,
                next_tactile: &step.observation.tactile,
                done,
            })?;
            observation = step.observation;

            if step.done || ep_len == rl.max_ep_len {
                logger.store("EpRet", ep_ret);
                logger.store("EpLen", ep_len as f32);
                observation = self.env.reset();
                ep_ret = 0.0;
                ep_len = 0;
            }

            if t >= rl.update_after && (t + 1) % rl.update_every == 0 {
                for _ in 0..rl.update_every {
                    let batch = self.buffer.sample_batch(rl.batch_size, &mut self.rng)?;
                    let metrics = self.agent.update(&batch);
                    logger.store("LossQ", metrics.loss_q);
                    logger.store("Q1Vals", metrics.q1);
                    logger.store("Q2Vals", metrics.q2);
                    if let Some(loss_pi) = metrics.loss_pi {
                        logger.store("LossPi", loss_pi);
                    }
                    if let Some(logp) = metrics.logp_pi {
                        logger.store("LogPi", logp);
                    }
                    if let Some(alpha) = metrics.alpha {
                        logger.store("Alpha", alpha);
                    }
                    outcome.updates += 1;
                }
            }

            if (t + 1) % rl.steps_per_epoch == 0 {
                let epoch = (t + 1) / rl.steps_per_epoch;
                let elapsed = start.elapsed_secs + timer.elapsed().as_secs_f64();
                let last_epoch = t + 1 == start.end_steps;
                if epoch % rl.save_freq == 0 || last_epoch {
                    self.save(epoch, t + 1, elapsed)?;
                }

                self.test_agent(&mut logger)?;

                logger.log_value("Epoch", epoch as f64);
                logger.log_tabular("EpRet", Stats::Full);
                logger.log_tabular("TestEpRet", Stats::Full);
                logger.log_tabular("EpLen", Stats::AverageOnly);
                logger.log_tabular("TestEpLen", Stats::AverageOnly);
                logger.log_tabular("TestSuccess", Stats::AverageOnly);
                logger.log_value("TotalEnvInteracts", (t + 1) as f64);
                logger.log_tabular("Q1Vals", Stats::Full);
                logger.log_tabular("Q2Vals", Stats::Full);
                if algorithm == Algorithm::Sac {
                    logger.log_tabular("LogPi", Stats::Full);
                    logger.log_tabular("Alpha", Stats::AverageOnly);
                }
                logger.log_tabular("LossPi", Stats::AverageOnly);
                logger.log_tabular("LossQ", Stats::AverageOnly);
                logger.log_value("Time", elapsed);
                outcome.last_row = logger.dump_tabular(epoch)?;
                outcome.epoch = epoch;
            }
            outcome.total_steps = t + 1;
        }
        Ok(outcome)
    }

    fn test_agent(&mut self, logger: &mut EpochLogger) -> Result<(), TrainError> {
        let max_ep_len = self.config.rl.max_ep_len;
        for _ in 0..self.config.rl.num_test_episodes {
            let mut observation = self.test_env.reset();
            let mut ep_ret = 0.0f32;
            let mut ep_len = 0usize;
            let mut success = false;
            while ep_len < max_ep_len {
                let action = self.agent.act(&observation, true, &mut self.rng);
                let step = self.test_env.step(&action)?;
                ep_ret += step.reward;
                ep_len += 1;
                observation = step.observation;
                if step.done {
                    success = true;
                    break;
                }
            }
            logger.store("TestEpRet", ep_ret);
            logger.store("TestEpLen", ep_len as f32);
            logger.store("TestSuccess", if success { 1.0 } else { 0.0 });
        }
        Ok(())
    }

    fn save(&self, epoch: usize, total_steps: usize, elapsed_secs: f64) -> Result<(), TrainError> {
        let dir = &self.config.logger.output_dir;
        let agent = self.agent.save_state()?;
        let checkpoint = TrainingCheckpoint {
            metadata: CheckpointMetadata {
                algorithm: self.agent.algorithm(),
                exp_name: self.config.logger.exp_name.clone(),
                seed: self.config.rl.seed,
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            rl_params: self.config.rl.clone(),
            network_params: self.config.network.clone(),
            env_config: self.config.env.clone(),
            logger_config: self.config.logger.clone(),
            resume: ResumeState {
                epoch,
                total_steps,
                updates: agent.updates,
                log_alpha: agent.log_alpha,
                elapsed_secs,
                progress_file: self.config.logger.output_fname.clone(),
            },
            agent,
        };
        let path = save_checkpoint(dir, &checkpoint)?;
        if self.config.rl.save_replay_buffer {
            save_replay_buffer(dir, &self.buffer)?;
        }
        println!("Saved checkpoint for epoch {epoch} -> {}", path.display());
        Ok(())
    }
}

/// Builds the agent for `algorithm` and trains it, from scratch or from a
/// saved model.
pub fn run_experiment<B: AutodiffBackend>(
    algorithm: Algorithm,
    config: RunConfig,
    resume: Option<ResumeParams>,
    device: &B::Device,
) -> Result<TrainOutcome, TrainError> {
    config.validate()?;
    let spec = EnvBuilder::from_config(config.env.clone()).build()?.spec();
    match algorithm {
        Algorithm::Td3 => {
            let agent = Td3Agent::<B>::new(&config.rl, &config.network, spec, device)?;
            drive(Trainer::new(agent, config)?, resume)
        }
        Algorithm::Sac => {
            let agent = SacAgent::<B>::new(&config.rl, &config.network, spec, device)?;
            drive(Trainer::new(agent, config)?, resume)
        }
    }
}

fn drive<A: OffPolicyAgent>(
    mut trainer: Trainer<A>,
    resume: Option<ResumeParams>,
) -> Result<TrainOutcome, TrainError> {
    match resume {
        Some(resume) => trainer.resume(resume),
        None => trainer.run(),
    }
}
