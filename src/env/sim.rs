use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::keyboard::{Keyboard, KeyboardLayout};
use super::tactile::TactileSensor;
use super::{Environment, Observation, ObservationSpec, Step};
use crate::error::EnvError;

const DEFAULT_SEED: u64 = 0xB4A1_11E5_EED5_0001;
pub const ACTION_DIM: usize = 2;

/// Parameters of the simulated tactile keyboard task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub layout: KeyboardLayout,
    pub image_size: [usize; 2],
    /// Width of the sensor window in key-pitch units.
    pub view_size: f32,
    /// Key-pitch units travelled for a full-scale action.
    pub move_scale: f32,
    pub action_scale: f32,
    pub sensor_noise: f32,
    pub success_reward: f32,
    pub step_reward: f32,
    pub seed: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            layout: KeyboardLayout::Arrows,
            image_size: [100, 100],
            view_size: 1.0,
            move_scale: 1.0,
            action_scale: 1.0,
            sensor_noise: 0.0,
            success_reward: 1.0,
            step_reward: -0.01,
            seed: DEFAULT_SEED,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<(), EnvError> {
        if self.image_size[0] == 0 || self.image_size[1] == 0 {
            return Err(EnvError::InvalidConfiguration("image size must be positive"));
        }
        if !(self.view_size > 0.0) {
            return Err(EnvError::InvalidConfiguration("view size must be positive"));
        }
        if !(self.move_scale > 0.0) {
            return Err(EnvError::InvalidConfiguration("move scale must be positive"));
        }
        if !(self.action_scale > 0.0) {
            return Err(EnvError::InvalidConfiguration("action scale must be positive"));
        }
        if !(self.sensor_noise >= 0.0) {
            return Err(EnvError::InvalidConfiguration("sensor noise must be non-negative"));
        }
        Ok(())
    }
}

/// Builder mirroring the CLI flags.
pub struct EnvBuilder {
    config: EnvConfig,
}

impl EnvBuilder {
    pub fn new(layout: KeyboardLayout) -> Self {
        Self {
            config: EnvConfig {
                layout,
                ..EnvConfig::default()
            },
        }
    }

    pub fn from_config(config: EnvConfig) -> Self {
        Self { config }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_image_size(mut self, height: usize, width: usize) -> Self {
        self.config.image_size = [height, width];
        self
    }

    pub fn with_sensor_noise(mut self, noise: f32) -> Self {
        self.config.sensor_noise = noise;
        self
    }

    pub fn with_rewards(mut self, success: f32, step: f32) -> Self {
        self.config.success_reward = success;
        self.config.step_reward = step;
        self
    }

    pub fn build(self) -> Result<SimBrailleEnv, EnvError> {
        SimBrailleEnv::new(self.config)
    }
}

/// Tactile sensor sliding over a braille keyboard towards a goal key.
pub struct SimBrailleEnv {
    config: EnvConfig,
    keyboard: Keyboard,
    sensor: TactileSensor,
    position: [f32; 2],
    goal: usize,
    prev_action: [f32; ACTION_DIM],
    done: bool,
    rng: StdRng,
}

impl SimBrailleEnv {
    pub fn new(config: EnvConfig) -> Result<Self, EnvError> {
        config.validate()?;
        let keyboard = Keyboard::new(config.layout);
        if keyboard.len() < 2 {
            return Err(EnvError::InvalidConfiguration(
                "keyboard needs at least two keys",
            ));
        }
        let sensor = TactileSensor::new(config.image_size, config.view_size, config.sensor_noise);
        let rng = StdRng::seed_from_u64(config.seed);
        let position = keyboard.keys()[0].center;
        Ok(Self {
            config,
            keyboard,
            sensor,
            position,
            goal: 1,
            prev_action: [0.0; ACTION_DIM],
            done: true,
            rng,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn position(&self) -> [f32; 2] {
        self.position
    }

    pub fn goal(&self) -> usize {
        self.goal
    }

    /// Starts an episode from a chosen key, used by evaluation tooling.
    pub fn reset_to(&mut self, start: usize, goal: usize) -> Result<Observation, EnvError> {
        let key = self
            .keyboard
            .key(start)
            .ok_or(EnvError::InvalidConfiguration("start key out of range"))?;
        if goal >= self.keyboard.len() {
            return Err(EnvError::InvalidConfiguration("goal key out of range"));
        }
        self.position = key.center;
        self.goal = goal;
        self.prev_action = [0.0; ACTION_DIM];
        self.done = false;
        Ok(self.observe())
    }

    fn observe(&mut self) -> Observation {
        let tactile = self.sensor.render(&self.keyboard, self.position, &mut self.rng);
        let mut goal = vec![0.0; self.keyboard.len()];
        goal[self.goal] = 1.0;
        Observation {
            tactile,
            goal,
            prev_action: self.prev_action.to_vec(),
        }
    }
}

impl Environment for SimBrailleEnv {
    fn spec(&self) -> ObservationSpec {
        ObservationSpec {
            image_dims: self.config.image_size,
            goal_dim: self.keyboard.len(),
            action_dim: ACTION_DIM,
            action_scale: self.config.action_scale,
        }
    }

    fn reset(&mut self) -> Observation {
        let keys = self.keyboard.len();
        self.goal = self.rng.gen_range(0..keys);
        let mut start = self.rng.gen_range(0..keys - 1);
        if start >= self.goal {
            start += 1;
        }
        self.position = self.keyboard.keys()[start].center;
        self.prev_action = [0.0; ACTION_DIM];
        self.done = false;
        self.observe()
    }

    fn step(&mut self, action: &[f32]) -> Result<Step, EnvError> {
        if self.done {
            return Err(EnvError::EpisodeOver);
        }
        if action.len() != ACTION_DIM {
            return Err(EnvError::ActionDimension {
                expected: ACTION_DIM,
                actual: action.len(),
            });
        }
        if let Some(index) = action.iter().position(|v| !v.is_finite()) {
            return Err(EnvError::NonFiniteAction(index));
        }
        let scale = self.config.action_scale;
        let mut clipped = [0.0; ACTION_DIM];
        for (slot, value) in clipped.iter_mut().zip(action) {
            *slot = value.clamp(-scale, scale);
        }
        let step_size = self.config.move_scale / scale;
        self.position = self.keyboard.clamp([
            self.position[0] + clipped[0] * step_size,
            self.position[1] + clipped[1] * step_size,
        ]);
        self.prev_action = clipped;
        let pressed = self.keyboard.key_at(self.position);
        let reached = pressed == Some(self.goal);
        self.done = reached;
        let reward = if reached {
            self.config.success_reward
        } else {
            self.config.step_reward
        };
        Ok(Step {
            observation: self.observe(),
            reward,
            done: reached,
            pressed,
        })
    }

    fn sample_action(&mut self) -> Vec<f32> {
        let scale = self.config.action_scale;
        (0..ACTION_DIM)
            .map(|_| self.rng.gen_range(-scale..=scale))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_env(seed: u64) -> SimBrailleEnv {
        EnvBuilder::new(KeyboardLayout::Arrows)
            .with_image_size(8, 8)
            .with_seed(seed)
            .build()
            .expect("env")
    }

    #[test]
    fn reset_never_starts_on_goal() {
        let mut env = small_env(11);
        for _ in 0..50 {
            env.reset();
            assert_ne!(env.keyboard().key_at(env.position()), Some(env.goal()));
        }
    }

    #[test]
    fn observation_shapes_match_spec() {
        let mut env = small_env(1);
        let spec = env.spec();
        let obs = env.reset();
        assert_eq!(obs.tactile.len(), spec.tactile_len());
        assert_eq!(obs.goal.len(), spec.goal_dim);
        assert_eq!(obs.goal.iter().sum::<f32>(), 1.0);
        assert_eq!(obs.prev_action, vec![0.0; ACTION_DIM]);
    }

    #[test]
    fn moving_onto_goal_finishes_episode() {
        let mut env = small_env(5);
        // LEFT -> DOWN is one key to the right
        env.reset_to(1, 2).expect("reset");
        let step = env.step(&[1.0, 0.0]).expect("step");
        assert!(step.done);
        assert_eq!(step.pressed, Some(2));
        assert_eq!(step.reward, env.config().success_reward);
        assert_eq!(step.observation.prev_action, vec![1.0, 0.0]);
        assert_eq!(env.step(&[0.0, 0.0]).unwrap_err(), EnvError::EpisodeOver);
    }

    #[test]
    fn actions_are_clipped_and_validated() {
        let mut env = small_env(5);
        env.reset_to(1, 0).expect("reset");
        let step = env.step(&[5.0, 0.0]).expect("step");
        assert_eq!(step.observation.prev_action, vec![1.0, 0.0]);
        assert!(!step.done);
        assert_eq!(step.reward, env.config().step_reward);
        assert_eq!(
            env.step(&[0.0]).unwrap_err(),
            EnvError::ActionDimension {
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(
            env.step(&[f32::NAN, 0.0]).unwrap_err(),
            EnvError::NonFiniteAction(0)
        );
    }

    #[test]
    fn sampled_actions_stay_in_bounds() {
        let mut env = small_env(9);
        for _ in 0..100 {
            let action = env.sample_action();
            assert!(action.iter().all(|a| a.abs() <= 1.0));
        }
    }

    #[test]
    fn same_seed_same_episodes() {
        let mut a = small_env(21);
        let mut b = small_env(21);
        for _ in 0..5 {
            assert_eq!(a.reset(), b.reset());
        }
    }
}
