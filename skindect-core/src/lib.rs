#![cfg(any(feature = "ndarray", feature = "tch", feature = "candle"))]

mod cli;
mod data;
mod error;
mod figure;
mod model;
mod predict;
mod report;
mod serve;

pub use cli::run;
pub use error::Error;
pub use model::{SkinClassifier, SkinClassifierConfig, CLASS_NAMES, IMAGE_SIZE, NUM_CLASSES};
pub use predict::Predictor;
pub use report::Ranking;
pub use serve::{router, serve, AppState, ModelState};
