//! Velocity-model contract
//!
//! The target builders never see a concrete architecture. They only need a
//! callable that maps a noisy batch to a velocity estimate, conditioned on
//! the timestep, the step-size exponent, and a class label.

use burn::prelude::*;

/// A step-size-conditioned velocity field.
///
/// Implementations predict the velocity `v(x_t, t)` of a flow-matching
/// process, additionally conditioned on `dt_base` (the step-size exponent,
/// where the step size is `1 / 2^dt_base`) and a per-sample class label.
///
/// The target builders call [`predict`](VelocityModel::predict) for
/// inference only and detach the results, so predictions never enter the
/// caller's autodiff graph. Implementations backed by a training module on
/// an autodiff backend should wrap the inner module obtained from
/// `Module::valid()`; switching back to training mode afterwards is the
/// caller's responsibility.
pub trait VelocityModel<B: Backend> {
    /// Predict the velocity for a batch of noisy samples.
    ///
    /// # Arguments
    /// * `x_t` - Noisy samples [batch, channels, height, width]
    /// * `t` - Timesteps in [0, 1) [batch]
    /// * `dt_base` - Step-size exponents used as conditioning [batch]
    /// * `labels` - Class labels [batch]
    ///
    /// # Returns
    /// Velocity estimate with the same shape as `x_t`.
    fn predict(
        &self,
        x_t: Tensor<B, 4>,
        t: Tensor<B, 1>,
        dt_base: Tensor<B, 1, Int>,
        labels: Tensor<B, 1, Int>,
    ) -> Tensor<B, 4>;

    /// The device tensors fed to this model must live on.
    fn device(&self) -> B::Device;
}

/// A velocity field that always predicts zero.
///
/// Deterministic stand-in for tests and schedule debugging: with it, the
/// bootstrap half-step degenerates to the identity and every distilled
/// target is zero.
#[derive(Debug, Clone)]
pub struct ZeroVelocity<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ZeroVelocity<B> {
    /// Create a zero-velocity stand-in on the given device.
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> VelocityModel<B> for ZeroVelocity<B> {
    fn predict(
        &self,
        x_t: Tensor<B, 4>,
        _t: Tensor<B, 1>,
        _dt_base: Tensor<B, 1, Int>,
        _labels: Tensor<B, 1, Int>,
    ) -> Tensor<B, 4> {
        x_t.zeros_like()
    }

    fn device(&self) -> B::Device {
        self.device.clone()
    }
}
