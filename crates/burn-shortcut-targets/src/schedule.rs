//! Logarithmic step-size schedule for bootstrap sub-batches
//!
//! Every self-distillation sample carries a step-size exponent `e`; its step
//! is `dt = 1 / 2^e` and the two inner model calls advance by `dt / 2`. The
//! schedule assigns the sub-batch decreasing exponents in equal groups, so a
//! single batch trains all step sizes at once.
//!
//! The schedule is computed host-side and uploaded, like the noise-schedule
//! tables of inference samplers.

use burn::prelude::*;

/// Per-sample step-size exponents for one bootstrap sub-batch.
#[derive(Debug, Clone)]
pub struct StepSchedule {
    exponents: Vec<i64>,
}

impl StepSchedule {
    /// Partition `bootstrap_size` slots into `log2_sections` groups of
    /// decreasing exponent `L-1, L-2, ..., 0`, each repeated
    /// `bootstrap_size / log2_sections` times.
    ///
    /// Slots the interleave leaves unassigned (when `bootstrap_size` is not
    /// a multiple of `log2_sections`) are filled with exponent 0 rather
    /// than extending a group. This matches the reference construction
    /// exactly; it over-represents the finest step and is kept as-is.
    ///
    /// A non-negative `force_dt` pins every slot to that exponent.
    pub fn new(bootstrap_size: usize, log2_sections: usize, force_dt: i64) -> Self {
        let mut exponents = Vec::with_capacity(bootstrap_size);

        if log2_sections > 0 {
            let per_section = bootstrap_size / log2_sections;
            for section in 0..log2_sections {
                let exponent = (log2_sections - 1 - section) as i64;
                exponents.extend(std::iter::repeat(exponent).take(per_section));
            }
        }
        exponents.resize(bootstrap_size, 0);

        if force_dt >= 0 {
            exponents.iter_mut().for_each(|e| *e = force_dt);
        }

        Self { exponents }
    }

    /// Number of scheduled samples.
    pub fn len(&self) -> usize {
        self.exponents.len()
    }

    /// Whether the schedule covers no samples at all.
    pub fn is_empty(&self) -> bool {
        self.exponents.is_empty()
    }

    /// The raw step-size exponents.
    pub fn exponents(&self) -> &[i64] {
        &self.exponents
    }

    /// Step sizes `dt = 1 / 2^e`.
    pub fn dt(&self) -> Vec<f32> {
        self.exponents
            .iter()
            .map(|&e| 1.0 / (1u64 << e) as f32)
            .collect()
    }

    /// Half-step sizes `dt / 2`, taken by each of the two inner model calls.
    pub fn half_dt(&self) -> Vec<f32> {
        self.exponents
            .iter()
            .map(|&e| 1.0 / (1u64 << (e + 1)) as f32)
            .collect()
    }

    /// Grid resolutions `2^e`: the number of valid start points for a step
    /// of size `1 / 2^e`.
    pub fn sections(&self) -> Vec<f32> {
        self.exponents
            .iter()
            .map(|&e| (1u64 << e) as f32)
            .collect()
    }

    /// The exponents as an int tensor on `device`.
    pub fn dt_base<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        Tensor::from_data(
            TensorData::new(self.exponents.clone(), [self.exponents.len()]),
            device,
        )
    }

    /// The half-step exponents `e + 1` as an int tensor on `device`; used
    /// only as conditioning input for the two inner model calls.
    pub fn dt_base_bootstrap<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        let shifted: Vec<i64> = self.exponents.iter().map(|&e| e + 1).collect();
        Tensor::from_data(TensorData::new(shifted, [self.exponents.len()]), device)
    }

    /// The half-step sizes as a float tensor on `device`.
    pub fn half_dt_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        Tensor::from_data(TensorData::new(self.half_dt(), [self.exponents.len()]), device)
    }

    /// The grid resolutions as a float tensor on `device`.
    pub fn sections_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        Tensor::from_data(
            TensorData::new(self.sections(), [self.exponents.len()]),
            device,
        )
    }
}
