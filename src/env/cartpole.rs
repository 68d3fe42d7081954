use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Environment, Step};
use crate::error::{OnPolicyError, Result};

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const TOTAL_MASS: f32 = CART_MASS + POLE_MASS;
const POLE_HALF_LENGTH: f32 = 0.5;
const POLE_MASS_LENGTH: f32 = POLE_MASS * POLE_HALF_LENGTH;
const FORCE_MAG: f32 = 10.0;
const DT: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * std::f32::consts::PI / 180.0;

/// Classic cart-pole balancing task.
///
/// Action 0 pushes the cart left, action 1 pushes it right. Every step earns a
/// reward of 1; the episode ends when the pole falls past 12 degrees, the cart
/// leaves the track, or the step limit is reached.
pub struct CartPole {
    x: f32,
    x_dot: f32,
    theta: f32,
    theta_dot: f32,
    steps: usize,
    max_steps: usize,
    done: bool,
    rng: StdRng,
}

impl CartPole {
    pub const REWARD_THRESHOLD: f32 = 195.0;

    pub fn new() -> Self {
        Self::with_max_steps(200)
    }

    pub fn with_max_steps(max_steps: usize) -> Self {
        CartPole {
            x: 0.0,
            x_dot: 0.0,
            theta: 0.0,
            theta_dot: 0.0,
            steps: 0,
            max_steps,
            // forces a reset before the first step
            done: true,
            rng: StdRng::from_entropy(),
        }
    }

    fn state(&self) -> Array1<f32> {
        array![self.x, self.x_dot, self.theta, self.theta_dot]
    }
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for CartPole {
    fn observation_size(&self) -> usize {
        4
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Array1<f32>> {
        self.x = self.rng.gen_range(-0.05..0.05);
        self.x_dot = self.rng.gen_range(-0.05..0.05);
        self.theta = self.rng.gen_range(-0.05..0.05);
        self.theta_dot = self.rng.gen_range(-0.05..0.05);
        self.steps = 0;
        self.done = false;
        Ok(self.state())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        if action >= 2 {
            return Err(OnPolicyError::InvalidAction { action, max_actions: 2 });
        }
        if self.done {
            return Err(OnPolicyError::environment("step called on a finished episode; reset first"));
        }

        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let cos_theta = self.theta.cos();
        let sin_theta = self.theta.sin();

        let temp = (force + POLE_MASS_LENGTH * self.theta_dot.powi(2) * sin_theta) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_HALF_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta.powi(2) / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos_theta / TOTAL_MASS;

        // explicit Euler
        self.x += DT * self.x_dot;
        self.x_dot += DT * x_acc;
        self.theta += DT * self.theta_dot;
        self.theta_dot += DT * theta_acc;
        self.steps += 1;

        self.done = self.x.abs() > X_THRESHOLD
            || self.theta.abs() > THETA_THRESHOLD
            || self.steps >= self.max_steps;

        Ok(Step {
            observation: self.state(),
            reward: 1.0,
            done: self.done,
        })
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn reward_threshold(&self) -> Option<f32> {
        Some(Self::REWARD_THRESHOLD)
    }
}
