//! Compile-time backend selection
//!
//! The `cuda` feature trains on the GPU; otherwise the NdArray CPU backend
//! is used. Training always wraps the backend in `Autodiff`, evaluation
//! runs on the plain backend.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray")))]
compile_error!("Enable a backend feature: `cuda` or `ndarray`");

/// Backend used by the training passes
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Backend used by validation and benchmarking
pub type EvalBackend = DefaultBackend;

pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

/// Human-readable backend name for banners and logs
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
