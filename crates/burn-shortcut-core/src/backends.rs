//! Backend support for burn-shortcut
//!
//! Enable the desired backend via feature flags:
//!
//! - `ndarray`: CPU backend using ndarray (no GPU required)
//! - `wgpu`: WebGPU backend (cross-platform GPU support)
//! - `cuda`: Native CUDA backend (NVIDIA GPUs only)
//!
//! When several backends are enabled, [`DefaultBackend`] resolves to the
//! most accelerated one, with ndarray as the CPU fallback.
//!
//! # Example
//!
//! ```toml
//! [dependencies]
//! burn-shortcut-core = { version = "0.1", features = ["wgpu"] }
//! ```
//!
//! ```ignore
//! use burn_shortcut_core::backends::{default_device, DefaultBackend};
//!
//! let device = default_device();
//! let batch = build_bootstrap_targets::<DefaultBackend, _>(images, labels, &model, &config)?;
//! ```

#[cfg(feature = "ndarray")]
pub use burn::backend::ndarray::{NdArray, NdArrayDevice};

#[cfg(feature = "wgpu")]
pub use burn::backend::wgpu::{Wgpu, WgpuDevice};

#[cfg(feature = "cuda")]
pub use burn::backend::cuda::{Cuda, CudaDevice};

/// Type alias for the default backend when using the cuda feature
#[cfg(feature = "cuda")]
pub type DefaultBackend = Cuda;

/// Type alias for the default backend when using the wgpu feature
#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type DefaultBackend = Wgpu;

/// Type alias for the default backend when using the ndarray feature
#[cfg(all(feature = "ndarray", not(any(feature = "cuda", feature = "wgpu"))))]
pub type DefaultBackend = NdArray;

/// Get the default device for the enabled backend
#[cfg(feature = "cuda")]
pub fn default_device() -> CudaDevice {
    CudaDevice::default()
}

/// Get the default device for the enabled backend
#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub fn default_device() -> WgpuDevice {
    WgpuDevice::default()
}

/// Get the default device for the enabled backend
#[cfg(all(feature = "ndarray", not(any(feature = "cuda", feature = "wgpu"))))]
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
