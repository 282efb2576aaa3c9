//! Per-sample scalar broadcasting
//!
//! Timesteps and step sizes are one scalar per sample. To scale an image
//! batch with them they must be expanded to `[batch, 1, 1, 1]` so that
//! elementwise ops broadcast across the channel and spatial axes.

use burn::prelude::*;

/// Expand a per-sample scalar `[batch]` to `[batch, 1, 1, 1]`.
///
/// The result multiplies directly against `[batch, channels, height, width]`
/// tensors under burn's broadcasting rules.
pub fn per_sample<B: Backend>(values: Tensor<B, 1>) -> Tensor<B, 4> {
    let [batch] = values.dims();
    values.reshape([batch, 1, 1, 1])
}
