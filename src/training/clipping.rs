//! Global gradient-norm clipping
//!
//! Burn's optimizer-level clipping bounds each parameter tensor on its own.
//! Here the L2 norm is taken over every gradient of the module at once and,
//! when it exceeds the threshold, all gradients are scaled by the same
//! factor so their joint norm equals the threshold.

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};

/// Avoids dividing by a vanishing norm
const NORM_EPS: f64 = 1e-6;

/// Sums squared gradient entries over the visited parameters
struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    sum: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            let squared: f64 = grad.powf_scalar(2.0).sum().into_scalar().elem();
            self.sum += squared;
        }
    }
}

/// Multiplies every visited gradient by `scale`
struct ScaleGrads<'a> {
    grads: &'a mut GradientsParams,
    scale: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register(id, grad.mul_scalar(self.scale));
        }
    }
}

/// L2 norm over all gradients belonging to `module`
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm { grads, sum: 0.0 };
    module.visit(&mut visitor);
    visitor.sum.sqrt()
}

/// Factor applied to every gradient when the joint norm is `norm`
pub fn clip_coefficient(norm: f64, max_norm: f64) -> f64 {
    (max_norm / (norm + NORM_EPS)).min(1.0)
}

/// Rescale `grads` so their joint L2 norm is at most `max_norm`.
///
/// Returns the norm measured before clipping.
pub fn clip_grad_norm<B, M>(module: &M, mut grads: GradientsParams, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm = global_grad_norm::<B, M>(module, &grads);
    let scale = clip_coefficient(norm, max_norm);
    if scale < 1.0 {
        let mut visitor = ScaleGrads {
            grads: &mut grads,
            scale,
        };
        module.visit(&mut visitor);
    }
    (grads, norm)
}
