//! Bytes in, prediction out.

use std::sync::Arc;

use crate::config::{ModelConfig, Normalization};
use crate::error::InferenceError;
use crate::model::{ScoreModel, ServingModel};
use crate::prediction::Prediction;
use crate::preprocess::preprocess;

/// Shared, read-only front end to the classifier.
#[derive(Clone)]
pub struct InferenceAdapter {
    model: Arc<dyn ScoreModel>,
    input_size: u32,
    normalization: Normalization,
}

impl InferenceAdapter {
    pub fn new(model: Arc<dyn ScoreModel>, input_size: u32, normalization: Normalization) -> Self {
        Self {
            model,
            input_size,
            normalization,
        }
    }

    /// Adapter backed by TensorFlow Serving.
    pub fn serving(config: &ModelConfig) -> Self {
        Self::new(
            Arc::new(ServingModel::new(config)),
            config.input_size,
            config.normalization,
        )
    }

    /// Classify one encoded image. Decoding and resizing run on the
    /// blocking pool.
    pub async fn predict_bytes(&self, bytes: Arc<[u8]>) -> Result<Prediction, InferenceError> {
        let size = self.input_size;
        let normalization = self.normalization;
        let tensor =
            tokio::task::spawn_blocking(move || preprocess(&bytes, size, normalization)).await??;

        let scores = self.model.score(&tensor).await?;
        let prediction = Prediction::from_scores(&scores)?;
        tracing::debug!(
            class = %prediction.class_name,
            confidence = prediction.confidence,
            "Image classified"
        );
        Ok(prediction)
    }

    /// Classify each image independently. The output has one entry per
    /// input, in input order.
    pub async fn predict_batch(
        &self,
        images: Vec<Arc<[u8]>>,
    ) -> Vec<Result<Prediction, InferenceError>> {
        let total = images.len();
        let mut results = Vec::with_capacity(total);
        for (idx, bytes) in images.into_iter().enumerate() {
            let result = self.predict_bytes(bytes).await;
            if let Err(e) = &result {
                tracing::warn!(item = idx + 1, total, error = %e, "Batch item failed");
            }
            results.push(result);
        }
        results
    }
}
