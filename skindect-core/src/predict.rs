use crate::{
    data,
    error::Error,
    model::{SkinClassifier, NUM_CLASSES},
};
use burn::{module::Module, prelude::*, tensor::activation::softmax};
use image::DynamicImage;
use std::path::Path;

/// A loaded model plus its device. Built once at startup and shared
/// read-only across requests; inference never mutates model state.
pub struct Predictor<B: Backend> {
    model: SkinClassifier<B>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Build the architecture and attach the pretrained weights.
    pub fn load(weights: &Path, device: B::Device) -> Result<Self, Error> {
        let model = SkinClassifier::from_file(weights, &device)?;
        Ok(Self { model, device })
    }

    #[cfg(test)]
    pub(crate) fn from_model(model: SkinClassifier<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Single forward pass over a one-image batch, returning the softmax
    /// probability vector aligned with [`crate::CLASS_NAMES`].
    pub fn predict(&self, image: &DynamicImage) -> Result<Vec<f32>, Error> {
        let input = data::to_tensor::<B>(image, &self.device);
        let probabilities = softmax(self.model.forward(input), 1);
        let probabilities = probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Inference(format!("{e:?}")))?;
        if probabilities.len() != NUM_CLASSES {
            return Err(Error::Inference(format!(
                "expected {NUM_CLASSES} probabilities, got {}",
                probabilities.len()
            )));
        }
        Ok(probabilities)
    }

    pub fn num_params(&self) -> usize {
        self.model.num_params()
    }
}
