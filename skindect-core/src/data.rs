use crate::{error::Error, model::IMAGE_SIZE};
use burn::{
    prelude::*,
    tensor::{Device, TensorData},
};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

/// Decode raw upload bytes into an image.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, Error> {
    image::load_from_memory(bytes).map_err(|e| Error::Decode(e.to_string()))
}

/// Read and decode an image from disk (CLI path).
pub fn open_image(path: &Path) -> Result<DynamicImage, Error> {
    image::open(path).map_err(|e| Error::Decode(e.to_string()))
}

/// Shape an image into a single-item `[1, 3, 299, 299]` batch.
///
/// Any color mode is folded to RGB and the image is resized to exactly
/// 299x299. Pixel values deliberately stay in the native 0-255 range:
/// the training pipeline fed the network unscaled pixels, so rescaling
/// here would silently miscalibrate every prediction.
pub fn to_tensor<B: Backend>(image: &DynamicImage, device: &Device<B>) -> Tensor<B, 4> {
    let resized = image.resize_exact(IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle);
    let pixels = resized
        .into_rgb8()
        .into_raw()
        .into_iter()
        .map(f32::from)
        .collect::<Vec<_>>();
    Tensor::<B, 3>::from_data(
        TensorData::new(pixels, [IMAGE_SIZE, IMAGE_SIZE, 3]).convert::<B::FloatElem>(),
        device,
    )
    // [H, W, C] -> [C, H, W]
    .permute([2, 0, 1])
    .unsqueeze::<4>()
}
