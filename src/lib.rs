//! Off-policy reinforcement learning (TD3 and SAC) for a tactile braille-reading agent.

pub mod algos;
pub mod checkpoint;
pub mod env;
pub mod error;
pub mod logger;
pub mod ml;
pub mod visualize;

pub use crate::algos::{
    AgentState, Algorithm, OffPolicyAgent, ReplayBuffer, ResumeParams, RlParams, RunConfig,
    SacAgent, Td3Agent, TrainOutcome, Trainer, UpdateMetrics, run_experiment,
};
pub use crate::checkpoint::{ResumeState, SavedModel, TrainingCheckpoint, load_model};
pub use crate::env::{
    EnvBuilder, EnvConfig, Environment, KeyboardLayout, Observation, ObservationSpec,
    SimBrailleEnv,
};
pub use crate::error::{
    BufferError, CheckpointError, ConfigError, EnvError, NetworkError, TrainError,
};
pub use crate::logger::{EpochLogger, LoggerConfig, ProgressTable, Stats};
pub use crate::ml::{DeterministicPolicy, GaussianPolicy, NetworkParams, TwinCritic};
pub use crate::visualize::{VisualOptions, plot_learning_curves, render_keyboard, render_tactile};
