//! Tunables for target construction

use serde::{Deserialize, Serialize};

use crate::error::TargetError;

/// Interpolation epsilon: `x_t = (1 - (1-EPS)·t)·x_0 + t·x_1`, so a residue
/// of the noise survives even at `t = 1`.
pub const EPS: f64 = 1e-5;

/// Clamp bound for half-step states and distilled velocity targets.
pub const VALUE_CLIP: f64 = 4.0;

/// Configuration for the target builders.
///
/// Defaults reproduce the reference training setup. `force_t` and
/// `force_dt` are debugging overrides: a non-negative value pins every
/// sample's timestep (resp. step-size exponent) to that constant; the
/// sentinel `-1` leaves sampling on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// One of every `bootstrap_every` samples becomes a self-distillation
    /// sample; the rest stay plain flow-matching.
    pub bootstrap_every: usize,
    /// Resolution of the finest time grid. Must be a power of two.
    pub denoise_timesteps: usize,
    /// Probability of replacing a label with the unconditional id for
    /// classifier-free guidance. The reference setup keeps this at 1.0,
    /// which drops every label; tune it rather than editing code.
    pub class_dropout_prob: f64,
    /// Number of real classes. The id `num_classes` itself is reserved as
    /// the unconditional label.
    pub num_classes: usize,
    /// Pin every timestep to this value when non-negative.
    pub force_t: f64,
    /// Pin every bootstrap step-size exponent to this value when
    /// non-negative.
    pub force_dt: i64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            bootstrap_every: 8,
            denoise_timesteps: 128,
            class_dropout_prob: 1.0,
            num_classes: 1,
            force_t: -1.0,
            force_dt: -1,
        }
    }
}

impl TargetConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bootstrap ratio.
    pub fn with_bootstrap_every(mut self, bootstrap_every: usize) -> Self {
        self.bootstrap_every = bootstrap_every;
        self
    }

    /// Set the fine-grid resolution.
    pub fn with_denoise_timesteps(mut self, denoise_timesteps: usize) -> Self {
        self.denoise_timesteps = denoise_timesteps;
        self
    }

    /// Set the label dropout probability.
    pub fn with_class_dropout_prob(mut self, class_dropout_prob: f64) -> Self {
        self.class_dropout_prob = class_dropout_prob;
        self
    }

    /// Set the number of real classes.
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Pin every timestep to a constant.
    pub fn with_force_t(mut self, force_t: f64) -> Self {
        self.force_t = force_t;
        self
    }

    /// Pin every bootstrap step-size exponent to a constant.
    pub fn with_force_dt(mut self, force_dt: i64) -> Self {
        self.force_dt = force_dt;
        self
    }

    /// Number of step-size groups: `log2(denoise_timesteps)`.
    pub fn log2_sections(&self) -> usize {
        self.denoise_timesteps.ilog2() as usize
    }

    /// The reserved unconditional label id.
    pub fn unconditional_label(&self) -> i64 {
        self.num_classes as i64
    }

    /// Check the invariants the builders rely on.
    pub fn validate(&self) -> Result<(), TargetError> {
        if self.bootstrap_every == 0 {
            return Err(TargetError::InvalidConfig(
                "bootstrap_every must be positive".into(),
            ));
        }
        if !self.denoise_timesteps.is_power_of_two() {
            return Err(TargetError::InvalidConfig(format!(
                "denoise_timesteps must be a power of two, got {}",
                self.denoise_timesteps
            )));
        }
        if !(0.0..=1.0).contains(&self.class_dropout_prob) {
            return Err(TargetError::InvalidConfig(format!(
                "class_dropout_prob must lie in [0, 1], got {}",
                self.class_dropout_prob
            )));
        }
        Ok(())
    }
}
