use std::sync::Arc;

use actix_web::web;

use crate::classifier::labels::{Interpretation, LabelInterpreter};
use crate::classifier::model::{ClassificationModel, InferenceError};
use crate::classifier::preprocess::{PreprocessError, preprocess_bytes};
use crate::db::models::{NewPrediction, PredictionRecord};
use crate::db::prediction_repository::PredictionRepository;
use crate::storage::upload_store::{StorageError, StoredUpload, UploadStore};

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("Uploaded image is empty")]
    EmptyUpload,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Decode(#[from] PreprocessError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("Blocking task failed: {0}")]
    Blocking(String),
}

#[derive(Debug)]
pub struct UploadedImage {
    pub bytes: web::Bytes,
    pub file_name: String,
    pub content_type: Option<String>,
}

#[derive(Debug)]
pub struct PredictionOutcome {
    pub interpretation: Interpretation,
    pub image: StoredUpload,
    /// `None` when the history write failed; see `persistence_error`.
    pub record: Option<PredictionRecord>,
    pub persistence_error: Option<String>,
}

impl PredictionOutcome {
    /// Confidence as a percentage in `[0, 100]`, two decimals.
    pub fn confidence_percentage(&self) -> f32 {
        let pct = (self.interpretation.confidence as f64 * 100.0).clamp(0.0, 100.0);
        ((pct * 100.0).round() / 100.0) as f32
    }
}

/// Upload → preprocess → classify → interpret → persist.
#[derive(Clone)]
pub struct PredictionService {
    model: ClassificationModel,
    interpreter: Arc<LabelInterpreter>,
    predictions: PredictionRepository,
    uploads: UploadStore,
}

impl PredictionService {
    pub fn new(
        model: ClassificationModel,
        interpreter: LabelInterpreter,
        predictions: PredictionRepository,
        uploads: UploadStore,
    ) -> Self {
        let catalog_len = interpreter.catalog().len();
        if let Some(classes) = model.num_classes() {
            if classes != catalog_len {
                log::warn!(
                    "Catalog has {} classes but model reports {}; labels will be reported as Class_<index>",
                    catalog_len,
                    classes
                );
            }
        }
        Self {
            model,
            interpreter: Arc::new(interpreter),
            predictions,
            uploads,
        }
    }

    /// Scores raw image bytes without storing anything.
    pub async fn classify(&self, bytes: web::Bytes) -> Result<Interpretation, PredictionError> {
        let model = self.model.clone();
        let scores = web::block(move || -> Result<Vec<f32>, PredictionError> {
            let pre = preprocess_bytes(&bytes, model.target_size())?;
            Ok(model.predict(&pre.tensor)?)
        })
        .await
        .map_err(|e| PredictionError::Blocking(e.to_string()))??;

        Ok(self.interpreter.interpret(&scores, self.model.num_classes()))
    }

    /// Runs the full pipeline for `owner`.
    ///
    /// The upload is written to storage before classification and is kept
    /// even when decoding or inference fails. A failed history write does
    /// not fail the prediction; it is reported in `persistence_error`.
    pub async fn predict(
        &self,
        owner: &str,
        upload: UploadedImage,
    ) -> Result<PredictionOutcome, PredictionError> {
        if upload.bytes.is_empty() {
            return Err(PredictionError::EmptyUpload);
        }

        let image = self
            .uploads
            .save(
                upload.bytes.clone(),
                &upload.file_name,
                upload.content_type.as_deref(),
            )
            .await?;

        let interpretation = self.classify(upload.bytes).await?;
        log::info!(
            "Prediction for {}: {} ({:.2}%), crop={}, healthy={}",
            owner,
            interpretation.label,
            interpretation.confidence * 100.0,
            interpretation.crop_type,
            interpretation.is_healthy
        );

        let new = NewPrediction {
            owner: owner.to_string(),
            image_ref: image.reference.clone(),
            label: interpretation.label.clone(),
            confidence: interpretation.confidence,
            is_healthy: interpretation.is_healthy,
            crop_type: interpretation.crop_type.clone(),
        };

        let (record, persistence_error) = match self.predictions.save(new).await {
            Ok(record) => (Some(record), None),
            Err(e) => {
                log::error!("Failed to save prediction for {}: {}", owner, e);
                (None, Some(e.to_string()))
            }
        };

        Ok(PredictionOutcome {
            interpretation,
            image,
            record,
            persistence_error,
        })
    }
}
