use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::env::{Observation, ObservationSpec};
use crate::error::BufferError;

/// A single transition as handed to [`ReplayBuffer::store`].
#[derive(Clone, Debug)]
pub struct Transition<'a> {
    pub observation: &'a Observation,
    pub action: &'a [f32],
    pub reward: f32,
    pub next_tactile: &'a [f32],
    pub done: bool,
}

/// Flat, row-major minibatch.
///
/// The next observation shares the goal and uses `actions` as its previous
/// action.
#[derive(Clone, Debug, Default)]
pub struct TransitionBatch {
    pub size: usize,
    pub tactile: Vec<f32>,
    pub goals: Vec<f32>,
    pub prev_actions: Vec<f32>,
    pub actions: Vec<f32>,
    pub rewards: Vec<f32>,
    pub next_tactile: Vec<f32>,
    pub dones: Vec<f32>,
}

/// Fixed-capacity FIFO experience replay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayBuffer {
    tactile_len: usize,
    goal_dim: usize,
    action_dim: usize,
    tactile: Vec<f32>,
    goals: Vec<f32>,
    prev_actions: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    next_tactile: Vec<f32>,
    dones: Vec<f32>,
    capacity: usize,
    position: usize,
    len: usize,
}

impl ReplayBuffer {
    pub fn new(spec: &ObservationSpec, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tactile_len: spec.tactile_len(),
            goal_dim: spec.goal_dim,
            action_dim: spec.action_dim,
            tactile: Vec::new(),
            goals: Vec::new(),
            prev_actions: Vec::new(),
            actions: Vec::new(),
            rewards: Vec::new(),
            next_tactile: Vec::new(),
            dones: Vec::new(),
            capacity,
            position: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored rewards in slot order.
    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    /// Stored terminal flags (1.0 or 0.0) in slot order.
    pub fn dones(&self) -> &[f32] {
        &self.dones
    }

    /// Whether this buffer can hold transitions of `spec`.
    pub fn matches(&self, spec: &ObservationSpec) -> bool {
        self.tactile_len == spec.tactile_len()
            && self.goal_dim == spec.goal_dim
            && self.action_dim == spec.action_dim
    }

    /// Add a transition, overwriting the oldest one when full.
    pub fn store(&mut self, transition: Transition<'_>) -> Result<(), BufferError> {
        let obs = transition.observation;
        check_width("tactile", self.tactile_len, obs.tactile.len())?;
        check_width("goal", self.goal_dim, obs.goal.len())?;
        check_width("prev_action", self.action_dim, obs.prev_action.len())?;
        check_width("action", self.action_dim, transition.action.len())?;
        check_width("next_tactile", self.tactile_len, transition.next_tactile.len())?;

        let done = if transition.done { 1.0 } else { 0.0 };
        if self.rewards.len() < self.capacity {
            self.tactile.extend_from_slice(&obs.tactile);
            self.goals.extend_from_slice(&obs.goal);
            self.prev_actions.extend_from_slice(&obs.prev_action);
            self.actions.extend_from_slice(transition.action);
            self.rewards.push(transition.reward);
            self.next_tactile.extend_from_slice(transition.next_tactile);
            self.dones.push(done);
        } else {
            let i = self.position;
            write_row(&mut self.tactile, i, &obs.tactile);
            write_row(&mut self.goals, i, &obs.goal);
            write_row(&mut self.prev_actions, i, &obs.prev_action);
            write_row(&mut self.actions, i, transition.action);
            self.rewards[i] = transition.reward;
            write_row(&mut self.next_tactile, i, transition.next_tactile);
            self.dones[i] = done;
        }
        self.position = (self.position + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
        Ok(())
    }

    /// Uniformly sample `batch_size` transitions with replacement.
    pub fn sample_batch<R: Rng>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<TransitionBatch, BufferError> {
        if self.len == 0 {
            return Err(BufferError::Empty);
        }
        let mut batch = TransitionBatch {
            size: batch_size,
            tactile: Vec::with_capacity(batch_size * self.tactile_len),
            goals: Vec::with_capacity(batch_size * self.goal_dim),
            prev_actions: Vec::with_capacity(batch_size * self.action_dim),
            actions: Vec::with_capacity(batch_size * self.action_dim),
            rewards: Vec::with_capacity(batch_size),
            next_tactile: Vec::with_capacity(batch_size * self.tactile_len),
            dones: Vec::with_capacity(batch_size),
        };
        for _ in 0..batch_size {
            let i = rng.gen_range(0..self.len);
            batch.tactile.extend_from_slice(row(&self.tactile, i, self.tactile_len));
            batch.goals.extend_from_slice(row(&self.goals, i, self.goal_dim));
            batch
                .prev_actions
                .extend_from_slice(row(&self.prev_actions, i, self.action_dim));
            batch.actions.extend_from_slice(row(&self.actions, i, self.action_dim));
            batch.rewards.push(self.rewards[i]);
            batch
                .next_tactile
                .extend_from_slice(row(&self.next_tactile, i, self.tactile_len));
            batch.dones.push(self.dones[i]);
        }
        Ok(batch)
    }
}

fn check_width(field: &'static str, expected: usize, actual: usize) -> Result<(), BufferError> {
    if expected != actual {
        return Err(BufferError::FieldWidth {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

fn row(data: &[f32], index: usize, width: usize) -> &[f32] {
    &data[index * width..(index + 1) * width]
}

fn write_row(data: &mut [f32], index: usize, values: &[f32]) {
    let width = values.len();
    data[index * width..(index + 1) * width].copy_from_slice(values);
}
