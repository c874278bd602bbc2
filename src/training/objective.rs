//! Loss functions and the deep-supervision objective
//!
//! The objective sums five terms: the primary mask, the three
//! deep-supervision maps (all against the mask) and the edge map (against
//! the edge target). Terms are summed, not averaged.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::model::config::CriterionKind;
use crate::model::{upsample_maps, SaliencyOutput};

const PROB_EPS: f32 = 1e-6;

/// Per-map loss: `loss(prediction, target) -> scalar`
pub trait Criterion: Send + Sync {
    fn loss<B: Backend>(&self, pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1>;
}

/// BCE, soft IoU, or both
#[derive(Debug, Clone, Copy)]
pub struct SaliencyLoss {
    kind: CriterionKind,
}

impl SaliencyLoss {
    pub fn new(kind: CriterionKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> CriterionKind {
        self.kind
    }
}

impl Criterion for SaliencyLoss {
    fn loss<B: Backend>(&self, pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        match self.kind {
            CriterionKind::Bce => binary_cross_entropy(pred, target),
            CriterionKind::Iou => soft_iou(pred, target),
            CriterionKind::Structure => {
                binary_cross_entropy(pred.clone(), target.clone()) + soft_iou(pred, target)
            }
        }
    }
}

/// Mean binary cross-entropy on probabilities; soft targets are allowed
pub fn binary_cross_entropy<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let p = pred.clamp(PROB_EPS, 1.0 - PROB_EPS);
    let positive = target.clone() * p.clone().log();
    let negative = target.neg().add_scalar(1.0) * p.neg().add_scalar(1.0).log();
    (positive + negative).mean().neg()
}

/// `1 - (intersection + 1) / (union + 1)` per map, averaged over the batch
pub fn soft_iou<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let product = pred.clone() * target.clone();
    let inter = product.clone().sum_dim(3).sum_dim(2);
    let union = (pred + target - product).sum_dim(3).sum_dim(2);
    let iou = inter.add_scalar(1.0) / union.add_scalar(1.0);
    iou.neg().add_scalar(1.0).mean()
}

/// Sum of the five supervised terms for one batch
pub fn composite_loss<B: Backend, C: Criterion>(
    criterion: &C,
    output: &SaliencyOutput<B>,
    masks: Tensor<B, 4>,
    edges: Tensor<B, 4>,
) -> Tensor<B, 1> {
    let [_, _, height, width] = masks.dims();
    let align = |map: &Tensor<B, 4>| upsample_maps(map.clone(), height, width);
    let [ds1, ds2, ds3] = &output.deep_supervision;

    criterion.loss(align(&output.mask), masks.clone())
        + criterion.loss(align(ds1), masks.clone())
        + criterion.loss(align(ds2), masks.clone())
        + criterion.loss(align(ds3), masks)
        + criterion.loss(align(&output.edge), edges)
}

/// Mean absolute error between the primary mask and its target
pub fn batch_mae<B: Backend>(mask: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let [_, _, height, width] = target.dims();
    (upsample_maps(mask, height, width) - target).abs().mean()
}
