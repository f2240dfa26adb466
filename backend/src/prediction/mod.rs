pub mod service;

pub use service::{PredictionError, PredictionOutcome, PredictionService, UploadedImage};
