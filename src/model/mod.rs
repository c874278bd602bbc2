//! Model module: the network contract and a reference implementation
//!
//! The training loop and the evaluator only see [`SaliencyNetwork`]: a
//! module mapping `images[B, 3, H, W]` to a primary mask, an edge map and
//! three deep-supervision maps, all in `[0, 1]`. Any architecture that
//! implements the trait can be trained and benchmarked.

pub mod cnn;
pub mod config;

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use burn::tensor::Tensor;

// Re-export main types for convenience
pub use cnn::{SaliencyNet, SaliencyNetConfig};
pub use config::{CriterionKind, RunConfig, SchedulerKind};

/// Outputs of one forward pass
#[derive(Debug, Clone)]
pub struct SaliencyOutput<B: Backend> {
    /// Primary saliency mask `[B, 1, H, W]`
    pub mask: Tensor<B, 4>,
    /// Edge map `[B, 1, H, W]`
    pub edge: Tensor<B, 4>,
    /// Auxiliary maps supervised with the mask, possibly at lower resolution
    pub deep_supervision: [Tensor<B, 4>; 3],
}

/// A salient object detection network
pub trait SaliencyNetwork<B: Backend>: Module<B> {
    fn forward(&self, images: Tensor<B, 4>) -> SaliencyOutput<B>;
}

/// Bilinearly resample `[B, C, h, w]` maps to `[B, C, height, width]`.
///
/// Not differentiable on every backend; use [`upsample_maps`] inside
/// `forward` and the loss.
pub fn resize_maps<B: Backend>(maps: Tensor<B, 4>, height: usize, width: usize) -> Tensor<B, 4> {
    resample(maps, height, width, InterpolateMode::Bilinear)
}

/// Nearest-neighbour resample of `[B, C, h, w]` maps, safe under autodiff
pub fn upsample_maps<B: Backend>(maps: Tensor<B, 4>, height: usize, width: usize) -> Tensor<B, 4> {
    resample(maps, height, width, InterpolateMode::Nearest)
}

fn resample<B: Backend>(
    maps: Tensor<B, 4>,
    height: usize,
    width: usize,
    mode: InterpolateMode,
) -> Tensor<B, 4> {
    let [_, _, h, w] = maps.dims();
    if h == height && w == width {
        return maps;
    }
    interpolate(maps, [height, width], InterpolateOptions::new(mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_resize_maps_shape() {
        let device = Default::default();
        let maps = Tensor::<TestBackend, 4>::ones([2, 1, 4, 6], &device);
        let resized = resize_maps(maps, 9, 5);
        assert_eq!(resized.dims(), [2, 1, 9, 5]);
    }

    #[test]
    fn test_resize_constant_map_keeps_value() {
        let device = Default::default();
        let maps = Tensor::<TestBackend, 4>::full([1, 1, 3, 3], 0.25, &device);
        let mean: f32 = resize_maps(maps, 7, 7).mean().into_scalar();
        assert!((mean - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_upsample_repeats_pixels() {
        let device = Default::default();
        let maps = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 0.0], [0.0, 1.0]]]], &device);
        let up = upsample_maps(maps, 4, 4);
        assert_eq!(up.dims(), [1, 1, 4, 4]);

        let values = up.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&values[0..4], &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(&values[12..16], &[0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_upsample_backward_reaches_input() {
        type Grad = burn::backend::Autodiff<TestBackend>;
        let device = Default::default();
        let maps = Tensor::<Grad, 4>::ones([1, 1, 2, 2], &device).require_grad();

        let grads = upsample_maps(maps.clone(), 6, 6).sum().backward();
        let grad = maps.grad(&grads).unwrap();
        // each coarse pixel feeds a 3x3 block
        let total: f32 = grad.sum().into_scalar();
        assert!((total - 36.0).abs() < 1e-4);
    }
}
