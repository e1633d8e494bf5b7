//! Tactile braille keyboard environments.

pub mod keyboard;
pub mod sim;
pub mod tactile;

use serde::{Deserialize, Serialize};

use crate::error::EnvError;

pub use keyboard::{Key, Keyboard, KeyboardLayout};
pub use sim::{EnvBuilder, EnvConfig, SimBrailleEnv};
pub use tactile::TactileSensor;

/// What the agent perceives after every reset or step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Row-major tactile image.
    pub tactile: Vec<f32>,
    /// One-hot encoding of the goal key.
    pub goal: Vec<f32>,
    /// Action taken on the previous step, zeros after a reset.
    pub prev_action: Vec<f32>,
}

/// Static shapes shared by an environment and the networks acting in it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationSpec {
    pub image_dims: [usize; 2],
    pub goal_dim: usize,
    pub action_dim: usize,
    pub action_scale: f32,
}

impl ObservationSpec {
    pub fn tactile_len(&self) -> usize {
        self.image_dims[0] * self.image_dims[1]
    }
}

/// Outcome of a single environment step.
#[derive(Clone, Debug)]
pub struct Step {
    pub observation: Observation,
    pub reward: f32,
    pub done: bool,
    pub pressed: Option<usize>,
}

/// Interface shared by the training loop and evaluation tools.
pub trait Environment {
    fn spec(&self) -> ObservationSpec;
    fn reset(&mut self) -> Observation;
    fn step(&mut self, action: &[f32]) -> Result<Step, EnvError>;
    fn sample_action(&mut self) -> Vec<f32>;
}
