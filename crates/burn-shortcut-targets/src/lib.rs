//! Training-target construction for shortcut models
//!
//! A shortcut model is a flow-matching generative model whose velocity field
//! is additionally conditioned on a step-size exponent, so that one coarse
//! step can reproduce what two finer steps would do. This crate builds the
//! supervised regression targets for that training objective:
//!
//! - [`targets::build_bootstrap_targets`] - a mixed batch: a small
//!   self-distillation ("bootstrap") sub-batch whose targets come from two
//!   frozen half-step predictions of the current model, concatenated with
//!   plain flow-matching pairs for the rest of the batch.
//! - [`targets::build_naive_targets`] - flow-matching pairs only, for
//!   baselines and ablations.
//!
//! The builders are pure call-and-return: they hold no state, and every
//! batch is constructed fresh from the inputs and the model's detached
//! predictions. Randomness comes from the backend RNG; seed it with
//! `B::seed(..)` for reproducibility.
//!
//! # Modules
//!
//! - [`config`] - tunable constants ([`TargetConfig`])
//! - [`schedule`] - the logarithmic step-size schedule ([`StepSchedule`])
//! - [`targets`] - the batch builders and [`TargetBatch`]
//! - [`error`] - precondition failures ([`TargetError`])

pub mod config;
pub mod error;
pub mod schedule;
pub mod targets;

pub use config::{TargetConfig, EPS, VALUE_CLIP};
pub use error::TargetError;
pub use schedule::StepSchedule;
pub use targets::{build_bootstrap_targets, build_naive_targets, TargetBatch};
