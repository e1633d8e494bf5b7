//! Saved models and training resumption.
//!
//! An experiment directory holds `checkpoint.bin`, a bincode-encoded
//! [`TrainingCheckpoint`] whose network and optimizer records are burn
//! `BinBytesRecorder` payloads, and optionally `replay_buffer.bin`.

use std::fs;
use std::path::{Path, PathBuf};

use burn::record::{BinBytesRecorder, FullPrecisionSettings, Record, Recorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::algos::{AgentState, Algorithm, ReplayBuffer, RlParams};
use crate::env::EnvConfig;
use crate::error::CheckpointError;
use crate::logger::LoggerConfig;
use crate::ml::NetworkParams;

pub const CHECKPOINT_FILE: &str = "checkpoint.bin";
pub const REPLAY_BUFFER_FILE: &str = "replay_buffer.bin";

/// Serialize a module or optimizer record to bytes.
pub fn encode_record<B: Backend, R: Record<B>>(record: R) -> Result<Vec<u8>, CheckpointError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::new();
    Ok(Recorder::<B>::record(&recorder, record, ())?)
}

pub fn decode_record<B: Backend, R: Record<B>>(
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<R, CheckpointError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::new();
    Ok(Recorder::<B>::load::<R>(&recorder, bytes, device)?)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub algorithm: Algorithm,
    pub exp_name: String,
    pub seed: u64,
    pub crate_version: String,
}

/// Counters needed to continue a run where it stopped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    /// Number of completed epochs.
    pub epoch: usize,
    /// Environment steps taken so far.
    pub total_steps: usize,
    /// Gradient updates applied so far.
    pub updates: usize,
    pub log_alpha: Option<f32>,
    pub elapsed_secs: f64,
    /// Progress file the run was writing to.
    pub progress_file: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingCheckpoint {
    pub metadata: CheckpointMetadata,
    pub rl_params: RlParams,
    pub network_params: NetworkParams,
    pub env_config: EnvConfig,
    pub logger_config: LoggerConfig,
    pub agent: AgentState,
    pub resume: ResumeState,
}

/// Everything `load_model` recovers from an experiment directory.
#[derive(Clone, Debug)]
pub struct SavedModel {
    pub checkpoint: TrainingCheckpoint,
    pub replay_buffer: Option<ReplayBuffer>,
}

pub fn checkpoint_path(dir: &Path) -> PathBuf {
    dir.join(CHECKPOINT_FILE)
}

pub fn replay_buffer_path(dir: &Path) -> PathBuf {
    dir.join(REPLAY_BUFFER_FILE)
}

/// Writes `checkpoint.bin` through a temporary file.
pub fn save_checkpoint(dir: &Path, checkpoint: &TrainingCheckpoint) -> Result<PathBuf, CheckpointError> {
    fs::create_dir_all(dir)?;
    let bytes = bincode::serde::encode_to_vec(checkpoint, bincode::config::standard())?;
    let path = checkpoint_path(dir);
    write_atomic(&path, &bytes)?;
    Ok(path)
}

pub fn save_replay_buffer(dir: &Path, buffer: &ReplayBuffer) -> Result<PathBuf, CheckpointError> {
    fs::create_dir_all(dir)?;
    let bytes = bincode::serde::encode_to_vec(buffer, bincode::config::standard())?;
    let path = replay_buffer_path(dir);
    write_atomic(&path, &bytes)?;
    Ok(path)
}

pub fn load_checkpoint(dir: &Path) -> Result<TrainingCheckpoint, CheckpointError> {
    let path = checkpoint_path(dir);
    if !path.exists() {
        return Err(CheckpointError::NotFound(path));
    }
    let bytes = fs::read(&path)?;
    let (checkpoint, _): (TrainingCheckpoint, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    Ok(checkpoint)
}

/// `Ok(None)` when the run was saved without its buffer.
pub fn load_replay_buffer(dir: &Path) -> Result<Option<ReplayBuffer>, CheckpointError> {
    let path = replay_buffer_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    let (buffer, _): (ReplayBuffer, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    Ok(Some(buffer))
}

pub fn load_model(dir: &Path) -> Result<SavedModel, CheckpointError> {
    let checkpoint = load_checkpoint(dir)?;
    let replay_buffer = if checkpoint.rl_params.save_replay_buffer {
        load_replay_buffer(dir)?
    } else {
        None
    };
    Ok(SavedModel {
        checkpoint,
        replay_buffer,
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let tmp = path.with_extension("bin.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Observation, ObservationSpec};
    use crate::algos::Transition;

    fn checkpoint(save_replay_buffer: bool) -> TrainingCheckpoint {
        TrainingCheckpoint {
            metadata: CheckpointMetadata {
                algorithm: Algorithm::Sac,
                exp_name: "sac".into(),
                seed: 7,
                crate_version: env!("CARGO_PKG_VERSION").into(),
            },
            rl_params: RlParams {
                save_replay_buffer,
                ..RlParams::default()
            },
            network_params: NetworkParams::default(),
            env_config: EnvConfig::default(),
            logger_config: LoggerConfig::new("data", "sac", 7),
            agent: AgentState {
                algorithm: Algorithm::Sac,
                actor: vec![1, 2, 3],
                critic: vec![4],
                target_actor: None,
                target_critic: vec![5],
                actor_optimizer: Vec::new(),
                critic_optimizer: Vec::new(),
                updates: 12,
                log_alpha: Some(-1.5),
            },
            resume: ResumeState {
                epoch: 3,
                total_steps: 300,
                updates: 12,
                log_alpha: Some(-1.5),
                elapsed_secs: 4.5,
                progress_file: "progress.txt".into(),
            },
        }
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_model(dir.path()).unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[test]
    fn checkpoint_and_buffer_are_restored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = ObservationSpec {
            image_dims: [1, 2],
            goal_dim: 2,
            action_dim: 2,
            action_scale: 1.0,
        };
        let mut buffer = ReplayBuffer::new(&spec, 4);
        let obs = Observation {
            tactile: vec![0.1, 0.2],
            goal: vec![0.0, 1.0],
            prev_action: vec![0.0, 0.0],
        };
        buffer
            .store(Transition {
                observation: &obs,
                action: &[0.3, 0.4],
                reward: 1.0,
                next_tactile: &[0.5, 0.6],
                done: true,
            })
            .expect("store");
        save_checkpoint(dir.path(), &checkpoint(true)).expect("save");
        save_replay_buffer(dir.path(), &buffer).expect("save buffer");

        let saved = load_model(dir.path()).expect("load");
        assert_eq!(saved.checkpoint.resume.epoch, 3);
        assert_eq!(saved.checkpoint.metadata.seed, 7);
        assert_eq!(saved.checkpoint.agent.actor, vec![1, 2, 3]);
        let restored = saved.replay_buffer.expect("buffer");
        assert_eq!(restored.len(), 1);
        assert!(restored.matches(&spec));
        assert!(!dir.path().join("checkpoint.bin.tmp").exists());
    }

    #[test]
    fn buffer_is_skipped_when_not_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        save_checkpoint(dir.path(), &checkpoint(false)).expect("save");
        let saved = load_model(dir.path()).expect("load");
        assert!(saved.replay_buffer.is_none());
    }
}
