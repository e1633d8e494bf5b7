use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the simulated keyboard environment.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvError {
    #[error("action has {actual} components, expected {expected}")]
    ActionDimension { expected: usize, actual: usize },
    #[error("action component {0} is not finite")]
    NonFiniteAction(usize),
    #[error("episode is over, call reset first")]
    EpisodeOver,
    #[error("invalid environment configuration: {0}")]
    InvalidConfiguration(&'static str),
}

/// Errors raised while building network architectures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),
}

/// Errors raised when validating hyper-parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Errors raised by the replay buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("cannot sample from an empty replay buffer")]
    Empty,
    #[error("transition field `{field}` has {actual} values, expected {expected}")]
    FieldWidth {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised while saving or loading checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode checkpoint: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("failed to record model: {0}")]
    Record(#[from] burn::record::RecorderError),
    #[error("checkpoint was written by {found}, expected {expected}")]
    AlgorithmMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("checkpoint is missing `{0}`")]
    MissingState(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the training loop.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_error_display() {
        let err = EnvError::ActionDimension {
            expected: 2,
            actual: 3,
        };
        assert_eq!(err.to_string(), "action has 3 components, expected 2");
    }

    #[test]
    fn train_error_is_transparent() {
        let err = TrainError::from(BufferError::Empty);
        assert_eq!(err.to_string(), "cannot sample from an empty replay buffer");
    }
}
