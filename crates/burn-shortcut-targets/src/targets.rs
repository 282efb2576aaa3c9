//! Batch builders for shortcut-model training targets
//!
//! Two sibling builders produce `(x_t, v_t, t, dt_base, labels)` batches:
//!
//! - [`build_bootstrap_targets`] mixes a self-distillation sub-batch (one
//!   sample in every `bootstrap_every`) with plain flow-matching pairs. The
//!   sub-batch targets are the model's own averaged two-half-step
//!   predictions, so one coarse step learns to match two finer ones.
//! - [`build_naive_targets`] builds flow-matching pairs for the whole
//!   batch, with no model in the loop.
//!
//! Time runs from 0 (pure noise) to 1 (clean data):
//! `x_t = (1 - (1-ε)·t)·x_0 + t·x_1`.

use burn::prelude::*;
use burn::tensor::Distribution;
use tracing::{debug, trace};

use burn_shortcut_core::broadcast::per_sample;
use burn_shortcut_core::model::VelocityModel;

use crate::config::{TargetConfig, EPS, VALUE_CLIP};
use crate::error::TargetError;
use crate::schedule::StepSchedule;

/// One batch of training targets.
///
/// All five tensors share the leading batch dimension and sample ordering:
/// index `i` across the fields describes one training example.
#[derive(Debug, Clone)]
pub struct TargetBatch<B: Backend> {
    /// Noisy samples [batch, channels, height, width].
    pub x_t: Tensor<B, 4>,
    /// Velocity regression targets, same shape as `x_t`.
    pub v_t: Tensor<B, 4>,
    /// Timesteps in [0, 1) [batch].
    pub t: Tensor<B, 1>,
    /// Step-size exponents the model is conditioned on [batch].
    pub dt_base: Tensor<B, 1, Int>,
    /// Conditioning labels, after classifier-free-guidance dropout [batch].
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> TargetBatch<B> {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.t.dims()[0]
    }

    /// Whether the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep the first `n` samples.
    fn truncate(self, n: usize) -> Self {
        let [_, c, h, w] = self.x_t.dims();
        Self {
            x_t: self.x_t.slice([0..n, 0..c, 0..h, 0..w]),
            v_t: self.v_t.slice([0..n, 0..c, 0..h, 0..w]),
            t: self.t.slice([0..n]),
            dt_base: self.dt_base.slice([0..n]),
            labels: self.labels.slice([0..n]),
        }
    }

    /// Concatenate two batches along the sample axis.
    fn concat(front: Self, back: Self) -> Self {
        Self {
            x_t: Tensor::cat(vec![front.x_t, back.x_t], 0),
            v_t: Tensor::cat(vec![front.v_t, back.v_t], 0),
            t: Tensor::cat(vec![front.t, back.t], 0),
            dt_base: Tensor::cat(vec![front.dt_base, back.dt_base], 0),
            labels: Tensor::cat(vec![front.labels, back.labels], 0),
        }
    }
}

/// Build a mixed batch of self-distillation and flow-matching targets.
///
/// The first `batch_size / bootstrap_every` samples become the bootstrap
/// sub-batch: their targets are distilled from two detached half-step
/// predictions of `model`. The remainder of the batch is filled with the
/// head of a plain flow-matching batch built over the full input. Output
/// batch size equals input batch size.
///
/// Both model calls run on detached tensors, so nothing here enters an
/// autodiff graph; pass the inference view of a training module.
pub fn build_bootstrap_targets<B: Backend, M: VelocityModel<B>>(
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    model: &M,
    config: &TargetConfig,
) -> Result<TargetBatch<B>, TargetError> {
    config.validate()?;
    check_batch(&images, &labels)?;

    let device = model.device();
    let batch_size = images.dims()[0];
    let bootstrap_size = batch_size / config.bootstrap_every;
    let data_size = batch_size - bootstrap_size;

    debug!(batch_size, bootstrap_size, "building shortcut targets");

    let bootstrap = if bootstrap_size > 0 {
        Some(bootstrap_section(
            &images,
            &labels,
            model,
            config,
            bootstrap_size,
            &device,
        ))
    } else {
        None
    };
    let flow = flow_section(images, labels, config, &device);

    Ok(match bootstrap {
        Some(bootstrap) if data_size > 0 => {
            TargetBatch::concat(bootstrap, flow.truncate(data_size))
        }
        Some(bootstrap) => bootstrap,
        None => flow,
    })
}

/// Build flow-matching targets for the whole batch, with no
/// self-distillation component.
pub fn build_naive_targets<B: Backend>(
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    config: &TargetConfig,
    device: &B::Device,
) -> Result<TargetBatch<B>, TargetError> {
    config.validate()?;
    check_batch(&images, &labels)?;

    debug!(batch_size = images.dims()[0], "building naive targets");

    Ok(flow_section(images, labels, config, device))
}

fn check_batch<B: Backend>(
    images: &Tensor<B, 4>,
    labels: &Tensor<B, 1, Int>,
) -> Result<(), TargetError> {
    let images_n = images.dims()[0];
    let [labels_n] = labels.dims();
    if images_n != labels_n {
        return Err(TargetError::BatchMismatch {
            images: images_n,
            labels: labels_n,
        });
    }
    Ok(())
}

/// Self-distillation targets for the first `bootstrap_size` samples.
///
/// Each sample gets a step-size exponent from the [`StepSchedule`] and a
/// random start point on the coarse grid that exponent implies. Two
/// detached model calls advance half a step each; their averaged velocity,
/// clamped to `±VALUE_CLIP`, becomes the target for the single coarser
/// step. The returned rows keep the original `t`, `dt_base`, `x_t`, and
/// labels (pre-half-step, pre-dropout).
fn bootstrap_section<B: Backend, M: VelocityModel<B>>(
    images: &Tensor<B, 4>,
    labels: &Tensor<B, 1, Int>,
    model: &M,
    config: &TargetConfig,
    bootstrap_size: usize,
    device: &B::Device,
) -> TargetBatch<B> {
    let schedule = StepSchedule::new(bootstrap_size, config.log2_sections(), config.force_dt);
    trace!(exponents = ?schedule.exponents(), "bootstrap step-size schedule");

    let dt_base = schedule.dt_base::<B>(device);
    let conditioning = schedule.dt_base_bootstrap::<B>(device);
    let half_dt = schedule.half_dt_tensor::<B>(device);
    let sections = schedule.sections_tensor::<B>(device);

    // Start points on the coarse grid keep t + dt inside the unit interval.
    let t = sample_grid_times(sections, config.force_t, device);

    let [_, c, h, w] = images.dims();
    let x_1 = images.clone().slice([0..bootstrap_size, 0..c, 0..h, 0..w]);
    let labels = labels.clone().slice([0..bootstrap_size]);

    let x_0: Tensor<B, 4> = Tensor::random(x_1.shape(), Distribution::Normal(0.0, 1.0), device);
    let x_t = interpolate(x_0, x_1, &t);

    let v_b1 = model
        .predict(x_t.clone(), t.clone(), conditioning.clone(), labels.clone())
        .detach();

    let t2 = t.clone() + half_dt.clone();
    let x_t2 = (x_t.clone() + per_sample(half_dt) * v_b1.clone()).clamp(-VALUE_CLIP, VALUE_CLIP);
    let v_b2 = model.predict(x_t2, t2, conditioning, labels.clone()).detach();

    // Two half-steps collapse into one target for the coarser exponent.
    let v_t = ((v_b1 + v_b2) / 2.0).clamp(-VALUE_CLIP, VALUE_CLIP);

    TargetBatch {
        x_t,
        v_t,
        t,
        dt_base,
        labels,
    }
}

/// Plain flow-matching targets over the full batch.
///
/// The velocity target is the closed form `x_1 - (1-ε)·x_0` and needs no
/// model call; `dt_base` is pinned to the finest-resolution marker
/// `log2(denoise_timesteps)` for every sample.
fn flow_section<B: Backend>(
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
    config: &TargetConfig,
    device: &B::Device,
) -> TargetBatch<B> {
    let batch_size = images.dims()[0];

    let labels = drop_labels(labels, config, device);
    let t = sample_flow_times(batch_size, config.denoise_timesteps, config.force_t, device);

    let x_0: Tensor<B, 4> = Tensor::random(images.shape(), Distribution::Normal(0.0, 1.0), device);
    let x_1 = images;
    let x_t = interpolate(x_0.clone(), x_1.clone(), &t);
    let v_t = x_1 - x_0 * (1.0 - EPS);

    let dt_base = Tensor::full([batch_size], config.log2_sections() as i64, device);

    TargetBatch {
        x_t,
        v_t,
        t,
        dt_base,
        labels,
    }
}

/// `x_t = (1 - (1-ε)·t)·x_0 + t·x_1`, broadcasting `t` across CHW.
fn interpolate<B: Backend>(x_0: Tensor<B, 4>, x_1: Tensor<B, 4>, t: &Tensor<B, 1>) -> Tensor<B, 4> {
    let t4 = per_sample(t.clone());
    (t4.clone() * -(1.0 - EPS) + 1.0) * x_0 + t4 * x_1
}

/// Replace labels with the unconditional id with probability
/// `class_dropout_prob`, independently per sample.
fn drop_labels<B: Backend>(
    labels: Tensor<B, 1, Int>,
    config: &TargetConfig,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let [n] = labels.dims();
    let coin: Tensor<B, 1> = Tensor::random(
        [n],
        Distribution::Bernoulli(config.class_dropout_prob),
        device,
    );
    let unconditional = Tensor::full([n], config.unconditional_label(), device);
    labels.mask_where(coin.equal_elem(1.0), unconditional)
}

/// Uniformly sample a discrete start point on each sample's coarse grid:
/// `t = randint(0, 2^e) / 2^e`, vectorized as `floor(u · 2^e) / 2^e`.
fn sample_grid_times<B: Backend>(
    sections: Tensor<B, 1>,
    force_t: f64,
    device: &B::Device,
) -> Tensor<B, 1> {
    let [n] = sections.dims();
    if force_t >= 0.0 {
        return Tensor::full([n], force_t, device);
    }
    let u: Tensor<B, 1> = Tensor::random([n], Distribution::Uniform(0.0, 1.0), device);
    (u * sections.clone()).int().float() / sections
}

/// Uniformly sample timesteps on the fine grid:
/// `t = randint(0, T) / T` with `T = denoise_timesteps`.
fn sample_flow_times<B: Backend>(
    n: usize,
    denoise_timesteps: usize,
    force_t: f64,
    device: &B::Device,
) -> Tensor<B, 1> {
    if force_t >= 0.0 {
        return Tensor::full([n], force_t, device);
    }
    let grid = denoise_timesteps as f64;
    let u: Tensor<B, 1> = Tensor::random([n], Distribution::Uniform(0.0, 1.0), device);
    (u * grid).int().float() / grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn_shortcut_core::model::ZeroVelocity;

    type TB = NdArray;

    fn device() -> NdArrayDevice {
        NdArrayDevice::default()
    }

    fn zero_images(n: usize) -> Tensor<TB, 4> {
        Tensor::zeros([n, 3, 8, 8], &device())
    }

    fn arange_labels(n: usize) -> Tensor<TB, 1, Int> {
        let ids: Vec<i64> = (0..n as i64).collect();
        Tensor::from_data(TensorData::new(ids, [n]), &device())
    }

    fn int_vec(t: Tensor<TB, 1, Int>) -> Vec<i64> {
        t.into_data().to_vec::<i64>().unwrap()
    }

    fn float_vec(t: Tensor<TB, 1>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_bootstrap_preserves_batch_size() {
        TB::seed(7);
        let model = ZeroVelocity::new(device());
        let batch = build_bootstrap_targets(
            zero_images(64),
            arange_labels(64),
            &model,
            &TargetConfig::default(),
        )
        .unwrap();

        assert_eq!(batch.len(), 64);
        assert_eq!(batch.x_t.dims(), [64, 3, 8, 8]);
        assert_eq!(batch.v_t.dims(), [64, 3, 8, 8]);
        assert_eq!(batch.t.dims(), [64]);
        assert_eq!(batch.dt_base.dims(), [64]);
        assert_eq!(batch.labels.dims(), [64]);
    }

    #[test]
    fn test_batch_composition() {
        TB::seed(7);
        let model = ZeroVelocity::new(device());
        let batch = build_bootstrap_targets(
            zero_images(64),
            arange_labels(64),
            &model,
            &TargetConfig::default(),
        )
        .unwrap();

        // 8 distilled rows with the scheduled exponents, 56 flow rows at
        // the finest marker.
        let exponents = int_vec(batch.dt_base);
        assert_eq!(&exponents[..8], &[6, 5, 4, 3, 2, 1, 0, 0]);
        assert!(exponents[8..].iter().all(|&e| e == 7));
    }

    #[test]
    fn test_naive_dt_base_is_finest_marker() {
        TB::seed(1);
        let batch = build_naive_targets(
            zero_images(16),
            arange_labels(16),
            &TargetConfig::default(),
            &device(),
        )
        .unwrap();

        assert_eq!(batch.len(), 16);
        assert!(int_vec(batch.dt_base).iter().all(|&e| e == 7));
    }

    #[test]
    fn test_bootstrap_targets_are_clamped() {
        struct BigVelocity {
            device: NdArrayDevice,
        }
        impl VelocityModel<TB> for BigVelocity {
            fn predict(
                &self,
                x_t: Tensor<TB, 4>,
                _t: Tensor<TB, 1>,
                _dt_base: Tensor<TB, 1, Int>,
                _labels: Tensor<TB, 1, Int>,
            ) -> Tensor<TB, 4> {
                x_t.zeros_like() + 100.0
            }
            fn device(&self) -> NdArrayDevice {
                self.device.clone()
            }
        }

        TB::seed(7);
        let model = BigVelocity { device: device() };
        let batch = build_bootstrap_targets(
            zero_images(64),
            arange_labels(64),
            &model,
            &TargetConfig::default(),
        )
        .unwrap();

        let [_, c, h, w] = batch.v_t.dims();
        let distilled = batch.v_t.slice([0..8, 0..c, 0..h, 0..w]);
        let max = distilled.abs().max().into_data().to_vec::<f32>().unwrap()[0];
        assert_eq!(max, 4.0);
    }

    #[test]
    fn test_naive_closed_form_at_t_zero() {
        // At t = 0 the noisy sample is exactly the noise, so with zero
        // images the target must satisfy v_t = -(1-eps) * x_t.
        TB::seed(3);
        let config = TargetConfig::default().with_force_t(0.0);
        let batch =
            build_naive_targets(zero_images(8), arange_labels(8), &config, &device()).unwrap();

        let residual = batch.v_t + batch.x_t * (1.0 - EPS);
        let max = residual.abs().max().into_data().to_vec::<f32>().unwrap()[0];
        assert!(max < 1e-6);
    }

    #[test]
    fn test_dropout_disabled_keeps_labels() {
        TB::seed(11);
        let config = TargetConfig::default()
            .with_class_dropout_prob(0.0)
            .with_num_classes(10);
        let batch =
            build_naive_targets(zero_images(16), arange_labels(16), &config, &device()).unwrap();

        assert_eq!(int_vec(batch.labels), (0..16).collect::<Vec<i64>>());
    }

    #[test]
    fn test_dropout_full_replaces_all_labels() {
        TB::seed(11);
        // class_dropout_prob defaults to 1.0
        let config = TargetConfig::default().with_num_classes(10);
        let batch =
            build_naive_targets(zero_images(16), arange_labels(16), &config, &device()).unwrap();

        assert!(int_vec(batch.labels).iter().all(|&l| l == 10));
    }

    #[test]
    fn test_bootstrap_keeps_raw_labels_for_distilled_rows() {
        // Label dropout applies to the flow-matching rows only.
        TB::seed(2);
        let model = ZeroVelocity::new(device());
        let config = TargetConfig::default().with_num_classes(100);
        let batch =
            build_bootstrap_targets(zero_images(64), arange_labels(64), &model, &config).unwrap();

        let labels = int_vec(batch.labels);
        assert_eq!(&labels[..8], &(0..8).collect::<Vec<i64>>()[..]);
        assert!(labels[8..].iter().all(|&l| l == 100));
    }

    #[test]
    fn test_determinism_under_fixed_seed() {
        let model = ZeroVelocity::new(device());
        let config = TargetConfig::default();

        TB::seed(42);
        let first = build_bootstrap_targets(
            zero_images(64),
            arange_labels(64),
            &model,
            &config,
        )
        .unwrap();
        TB::seed(42);
        let second = build_bootstrap_targets(
            zero_images(64),
            arange_labels(64),
            &model,
            &config,
        )
        .unwrap();

        assert_eq!(
            first.x_t.into_data().to_vec::<f32>().unwrap(),
            second.x_t.into_data().to_vec::<f32>().unwrap()
        );
        assert_eq!(float_vec(first.t), float_vec(second.t));
        assert_eq!(int_vec(first.labels), int_vec(second.labels));
    }

    #[test]
    fn test_zero_size_bootstrap_sub_batch() {
        TB::seed(5);
        let model = ZeroVelocity::new(device());
        let config = TargetConfig::default().with_bootstrap_every(1000);
        let batch =
            build_bootstrap_targets(zero_images(8), arange_labels(8), &model, &config).unwrap();

        // No distilled rows at all: the whole batch is flow-matching.
        assert_eq!(batch.len(), 8);
        assert!(int_vec(batch.dt_base).iter().all(|&e| e == 7));
    }

    #[test]
    fn test_all_bootstrap_when_ratio_is_one() {
        TB::seed(5);
        let model = ZeroVelocity::new(device());
        let config = TargetConfig::default().with_bootstrap_every(1);
        let batch =
            build_bootstrap_targets(zero_images(14), arange_labels(14), &model, &config).unwrap();

        assert_eq!(batch.len(), 14);
        assert_eq!(
            int_vec(batch.dt_base),
            vec![6, 6, 5, 5, 4, 4, 3, 3, 2, 2, 1, 1, 0, 0]
        );
    }

    #[test]
    fn test_force_t_pins_every_timestep() {
        TB::seed(9);
        let model = ZeroVelocity::new(device());
        let config = TargetConfig::default().with_force_t(0.25);
        let batch =
            build_bootstrap_targets(zero_images(64), arange_labels(64), &model, &config).unwrap();

        assert!(float_vec(batch.t).iter().all(|&t| t == 0.25));
    }

    #[test]
    fn test_force_dt_pins_bootstrap_exponents() {
        TB::seed(9);
        let model = ZeroVelocity::new(device());
        let config = TargetConfig::default().with_force_dt(2);
        let batch =
            build_bootstrap_targets(zero_images(64), arange_labels(64), &model, &config).unwrap();

        let exponents = int_vec(batch.dt_base);
        assert!(exponents[..8].iter().all(|&e| e == 2));
        assert!(exponents[8..].iter().all(|&e| e == 7));
    }

    #[test]
    fn test_bootstrap_times_lie_on_their_grid() {
        TB::seed(13);
        let model = ZeroVelocity::new(device());
        let batch = build_bootstrap_targets(
            zero_images(64),
            arange_labels(64),
            &model,
            &TargetConfig::default(),
        )
        .unwrap();

        let t = float_vec(batch.t.slice([0..8]));
        let exponents = [6u32, 5, 4, 3, 2, 1, 0, 0];
        for (t, e) in t.iter().zip(exponents) {
            let sections = (1u64 << e) as f32;
            let steps = t * sections;
            assert!((steps - steps.round()).abs() < 1e-6);
            assert!(*t >= 0.0 && *t < 1.0);
            // a full step from any grid point stays inside the interval
            assert!(t + 1.0 / sections <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_batch_mismatch_is_rejected() {
        let model = ZeroVelocity::new(device());
        let result = build_bootstrap_targets(
            zero_images(8),
            arange_labels(4),
            &model,
            &TargetConfig::default(),
        );
        assert!(matches!(result, Err(TargetError::BatchMismatch { .. })));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TargetConfig::default().with_denoise_timesteps(100);
        let result = build_naive_targets(zero_images(8), arange_labels(8), &config, &device());
        assert!(matches!(result, Err(TargetError::InvalidConfig(_))));
    }
}
