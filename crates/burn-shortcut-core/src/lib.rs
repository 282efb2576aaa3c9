//! Shared building blocks for shortcut-model training
//!
//! This crate provides the pieces the target-construction crate and any
//! binaries agree on:
//!
//! - [`model`] - the velocity-field contract consumed by the target builders
//! - [`backends`] - feature-gated backend selection
//! - [`broadcast`] - per-sample scalar broadcasting helpers

pub mod backends;
pub mod broadcast;
pub mod model;
