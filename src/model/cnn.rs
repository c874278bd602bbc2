//! Reference saliency network
//!
//! A compact three-stage convolutional encoder with a side output per stage.
//! Side outputs are upsampled to the input size and used as the three
//! deep-supervision maps; a 1x1 convolution fuses them into the primary
//! mask, and a separate head on the first stage predicts the edge map.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

use super::{upsample_maps, SaliencyNetwork, SaliencyOutput};

/// Configuration for [`SaliencyNet`]
#[derive(Config, Debug)]
pub struct SaliencyNetConfig {
    /// Filters in the first stage, doubled at each following stage
    #[config(default = "16")]
    pub base_filters: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

impl SaliencyNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SaliencyNet<B> {
        SaliencyNet::new(self, device)
    }
}

/// Two 3x3 convolutions with ReLU followed by 2x2 max pooling
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv1,
            conv2,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv1.forward(x));
        let x = self.relu.forward(self.conv2.forward(x));
        self.pool.forward(x)
    }
}

/// Three-stage encoder with deep supervision and an edge head
#[derive(Module, Debug)]
pub struct SaliencyNet<B: Backend> {
    pub stage1: ConvBlock<B>,
    pub stage2: ConvBlock<B>,
    pub stage3: ConvBlock<B>,
    pub side1: Conv2d<B>,
    pub side2: Conv2d<B>,
    pub side3: Conv2d<B>,
    pub fuse: Conv2d<B>,
    pub edge_head: Conv2d<B>,
}

impl<B: Backend> SaliencyNet<B> {
    pub fn new(config: &SaliencyNetConfig, device: &B::Device) -> Self {
        let base = config.base_filters;
        let head = |channels: usize| Conv2dConfig::new([channels, 1], [1, 1]).init(device);

        Self {
            stage1: ConvBlock::new(config.in_channels, base, device), // H/2
            stage2: ConvBlock::new(base, base * 2, device),           // H/4
            stage3: ConvBlock::new(base * 2, base * 4, device),       // H/8
            side1: head(base),
            side2: head(base * 2),
            side3: head(base * 4),
            fuse: head(3),
            edge_head: Conv2dConfig::new([base, 1], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> SaliencyOutput<B> {
        let [_, _, height, width] = images.dims();

        let e1 = self.stage1.forward(images);
        let e2 = self.stage2.forward(e1.clone());
        let e3 = self.stage3.forward(e2.clone());

        let s1 = upsample_maps(self.side1.forward(e1.clone()), height, width);
        let s2 = upsample_maps(self.side2.forward(e2), height, width);
        let s3 = upsample_maps(self.side3.forward(e3), height, width);

        let fused = self
            .fuse
            .forward(Tensor::cat(vec![s1.clone(), s2.clone(), s3.clone()], 1));
        let edge = upsample_maps(self.edge_head.forward(e1), height, width);

        SaliencyOutput {
            mask: sigmoid(fused),
            edge: sigmoid(edge),
            deep_supervision: [sigmoid(s3), sigmoid(s2), sigmoid(s1)],
        }
    }
}

impl<B: Backend> SaliencyNetwork<B> for SaliencyNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> SaliencyOutput<B> {
        SaliencyNet::forward(self, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shapes() {
        let device = Default::default();
        let model: SaliencyNet<TestBackend> =
            SaliencyNetConfig::new().with_base_filters(4).init(&device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let out = SaliencyNetwork::forward(&model, images);

        assert_eq!(out.mask.dims(), [2, 1, 32, 32]);
        assert_eq!(out.edge.dims(), [2, 1, 32, 32]);
        for map in &out.deep_supervision {
            assert_eq!(map.dims(), [2, 1, 32, 32]);
        }
    }

    #[test]
    fn test_outputs_in_unit_range() {
        let device = Default::default();
        let model: SaliencyNet<TestBackend> =
            SaliencyNetConfig::new().with_base_filters(2).init(&device);

        let images = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let out = model.forward(images);

        let min: f32 = out.mask.clone().min().into_scalar();
        let max: f32 = out.mask.max().into_scalar();
        assert!(min >= 0.0 && max <= 1.0);
    }

    #[test]
    fn test_non_square_input() {
        let device = Default::default();
        let model: SaliencyNet<TestBackend> =
            SaliencyNetConfig::new().with_base_filters(2).init(&device);

        let out = model.forward(Tensor::zeros([1, 3, 24, 40], &device));
        assert_eq!(out.mask.dims(), [1, 1, 24, 40]);
    }

    #[test]
    fn test_backward_reaches_every_head() {
        type Grad = burn::backend::Autodiff<TestBackend>;
        let device = Default::default();
        let model: SaliencyNet<Grad> = SaliencyNetConfig::new().with_base_filters(2).init(&device);

        let out = model.forward(Tensor::ones([1, 3, 16, 16], &device));
        let [d1, d2, d3] = out.deep_supervision;
        let grads = (out.mask.sum() + out.edge.sum() + d1.sum() + d2.sum() + d3.sum()).backward();

        assert!(model.side3.weight.val().grad(&grads).is_some());
        assert!(model.edge_head.weight.val().grad(&grads).is_some());
        assert!(model.stage1.conv1.weight.val().grad(&grads).is_some());
    }
}
