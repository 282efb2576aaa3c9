//! Precondition failures for target construction
//!
//! Only cheap, up-front checks get an explicit error. Shape, device, and
//! numeric failures inside tensor ops propagate directly from the backend:
//! masking them would corrupt training silently.

use thiserror::Error;

/// Errors raised before any tensor work starts.
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("label batch size {labels} does not match image batch size {images}")]
    BatchMismatch { images: usize, labels: usize },

    #[error("invalid target configuration: {0}")]
    InvalidConfig(String),
}
