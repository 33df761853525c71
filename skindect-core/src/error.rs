use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between an incoming image and a ranked
/// prediction. Startup failures (`WeightsNotFound`, `WeightsLoad`) abort
/// initialization; the rest are per-request and map to HTTP status codes
/// in the service layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Weights file not found: {0}")]
    WeightsNotFound(PathBuf),
    #[error("Failed to load weights: {0}")]
    WeightsLoad(String),
    #[error("Error processing image: {0}")]
    Decode(String),
    #[error("No file uploaded. Please send image with key \"file\"")]
    NoFileUploaded,
    #[error("No file selected")]
    NoFileSelected,
    #[error("Invalid file type. Allowed: {0}")]
    InvalidExtension(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Could not display visualization: {0}")]
    Visualization(String),
}
