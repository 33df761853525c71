use crate::error::Error;
use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use std::path::Path;

/// Number of disease classes. Output index position is the contract
/// between the classifier head and [`CLASS_NAMES`].
pub const NUM_CLASSES: usize = 6;

/// Input resolution expected by the backbone (299x299 RGB).
pub const IMAGE_SIZE: usize = 299;

/// Labels in training order, never reordered at runtime.
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "1. Enfeksiyonel",
    "2. Ekzama",
    "3. Akne",
    "4. Pigment",
    "5. Benign",
    "6. Malign",
];

/// Depthwise 3x3 convolution followed by a pointwise 1x1 projection,
/// both unbiased as in the reference Xception.
#[derive(Module, Debug)]
pub(crate) struct SeparableConv2d<B: Backend> {
    depthwise: Conv2d<B>,
    pointwise: Conv2d<B>,
}

impl<B: Backend> SeparableConv2d<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pointwise.forward(self.depthwise.forward(x))
    }
}

#[derive(Config, Debug)]
struct SeparableConv2dConfig {
    channels: [usize; 2],
}

impl SeparableConv2dConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> SeparableConv2d<B> {
        let [c_in, c_out] = self.channels;
        SeparableConv2d {
            depthwise: Conv2dConfig::new([c_in, c_in], [3, 3])
                .with_groups(c_in)
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            pointwise: Conv2dConfig::new([c_in, c_out], [1, 1])
                .with_bias(false)
                .init(device),
        }
    }
}

/// Downsampling block: two separable convolutions and a strided max-pool
/// on the main path, a strided 1x1 projection on the shortcut.
#[derive(Module, Debug)]
pub(crate) struct DownsampleBlock<B: Backend> {
    shortcut: Conv2d<B>,
    shortcut_norm: BatchNorm<B, 2>,
    sep1: SeparableConv2d<B>,
    norm1: BatchNorm<B, 2>,
    sep2: SeparableConv2d<B>,
    norm2: BatchNorm<B, 2>,
    pool: MaxPool2d,
    relu: Relu,
}

impl<B: Backend> DownsampleBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = self.shortcut_norm.forward(self.shortcut.forward(x.clone()));
        let y = self.norm1.forward(self.sep1.forward(self.relu.forward(x)));
        let y = self.norm2.forward(self.sep2.forward(self.relu.forward(y)));
        self.pool.forward(y) + shortcut
    }
}

#[derive(Config, Debug)]
struct DownsampleBlockConfig {
    /// in -> mid -> out channel counts.
    channels: [usize; 3],
}

impl DownsampleBlockConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> DownsampleBlock<B> {
        let [c_in, c_mid, c_out] = self.channels;
        DownsampleBlock {
            shortcut: Conv2dConfig::new([c_in, c_out], [1, 1])
                .with_stride([2, 2])
                .with_bias(false)
                .init(device),
            shortcut_norm: BatchNormConfig::new(c_out).init(device),
            sep1: SeparableConv2dConfig::new([c_in, c_mid]).init(device),
            norm1: BatchNormConfig::new(c_mid).init(device),
            sep2: SeparableConv2dConfig::new([c_mid, c_out]).init(device),
            norm2: BatchNormConfig::new(c_out).init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            relu: Relu::new(),
        }
    }
}

/// Middle-flow block: three separable convolutions with an identity skip.
#[derive(Module, Debug)]
pub(crate) struct MiddleBlock<B: Backend> {
    sep1: SeparableConv2d<B>,
    norm1: BatchNorm<B, 2>,
    sep2: SeparableConv2d<B>,
    norm2: BatchNorm<B, 2>,
    sep3: SeparableConv2d<B>,
    norm3: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> MiddleBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = self.norm1.forward(self.sep1.forward(self.relu.forward(x.clone())));
        let y = self.norm2.forward(self.sep2.forward(self.relu.forward(y)));
        let y = self.norm3.forward(self.sep3.forward(self.relu.forward(y)));
        x + y
    }
}

#[derive(Config, Debug)]
struct MiddleBlockConfig {
    channels: usize,
}

impl MiddleBlockConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> MiddleBlock<B> {
        let c = self.channels;
        MiddleBlock {
            sep1: SeparableConv2dConfig::new([c, c]).init(device),
            norm1: BatchNormConfig::new(c).init(device),
            sep2: SeparableConv2dConfig::new([c, c]).init(device),
            norm2: BatchNormConfig::new(c).init(device),
            sep3: SeparableConv2dConfig::new([c, c]).init(device),
            norm3: BatchNormConfig::new(c).init(device),
            relu: Relu::new(),
        }
    }
}

/// Xception feature extractor: entry flow, repeated middle-flow blocks and
/// the exit flow, producing a `[batch, 2048, h, w]` feature map.
#[derive(Module, Debug)]
pub(crate) struct Xception<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    entry: Vec<DownsampleBlock<B>>,
    middle: Vec<MiddleBlock<B>>,
    exit: DownsampleBlock<B>,
    sep3: SeparableConv2d<B>,
    norm3: BatchNorm<B, 2>,
    sep4: SeparableConv2d<B>,
    norm4: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> Xception<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.norm1.forward(self.conv1.forward(x)));
        let x = self.relu.forward(self.norm2.forward(self.conv2.forward(x)));
        let x = self.entry.iter().fold(x, |x, block| block.forward(x));
        let x = self.middle.iter().fold(x, |x, block| block.forward(x));
        let x = self.exit.forward(x);
        let x = self.relu.forward(self.norm3.forward(self.sep3.forward(x)));
        self.relu.forward(self.norm4.forward(self.sep4.forward(x)))
    }
}

#[derive(Config, Debug)]
struct XceptionConfig {
    #[config(default = 8)]
    middle_blocks: usize,
}

impl XceptionConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> Xception<B> {
        Xception {
            conv1: Conv2dConfig::new([3, 32], [3, 3])
                .with_stride([2, 2])
                .with_bias(false)
                .init(device),
            norm1: BatchNormConfig::new(32).init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(64).init(device),
            entry: [[64, 128, 128], [128, 256, 256], [256, 728, 728]]
                .into_iter()
                .map(|channels| DownsampleBlockConfig::new(channels).init(device))
                .collect(),
            middle: (0..self.middle_blocks)
                .map(|_| MiddleBlockConfig::new(728).init(device))
                .collect(),
            exit: DownsampleBlockConfig::new([728, 728, 1024]).init(device),
            sep3: SeparableConv2dConfig::new([1024, 1536]).init(device),
            norm3: BatchNormConfig::new(1536).init(device),
            sep4: SeparableConv2dConfig::new([1536, 2048]).init(device),
            norm4: BatchNormConfig::new(2048).init(device),
            relu: Relu::new(),
        }
    }
}

/// The full classifier: Xception backbone, global average pooling and a
/// three-layer dense head ending in [`NUM_CLASSES`] logits.
#[derive(Module, Debug)]
pub struct SkinClassifier<B: Backend> {
    backbone: Xception<B>,
    pool: AdaptiveAvgPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    relu: Relu,
}

impl<B: Backend> SkinClassifier<B> {
    /// # Shapes
    ///   - Input [batch_size, 3, 299, 299], raw pixel range
    ///   - Output [batch_size, NUM_CLASSES] logits (softmax applied by the caller)
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.backbone.forward(x);
        let x = self.pool.forward(x).flatten::<2>(1, 3);
        let x = self.relu.forward(self.fc1.forward(x));
        let x = self.relu.forward(self.fc2.forward(x));
        self.fc3.forward(x)
    }

    /// Build the architecture and attach pretrained weights from `path`.
    pub fn from_file(path: &Path, device: &B::Device) -> Result<Self, Error> {
        if !path.exists() {
            return Err(Error::WeightsNotFound(path.to_path_buf()));
        }
        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)
            .map_err(|e| Error::WeightsLoad(e.to_string()))?;
        Ok(SkinClassifierConfig::new().init(device).load_record(record))
    }
}

#[derive(Config, Debug)]
pub struct SkinClassifierConfig {
    #[config(default = 6)]
    pub num_classes: usize,
    #[config(default = 8)]
    pub middle_blocks: usize,
}

impl SkinClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SkinClassifier<B> {
        SkinClassifier {
            backbone: XceptionConfig::new()
                .with_middle_blocks(self.middle_blocks)
                .init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(2048, 1024).init(device),
            fc2: LinearConfig::new(1024, 512).init(device),
            fc3: LinearConfig::new(512, self.num_classes).init(device),
            relu: Relu::new(),
        }
    }
}
