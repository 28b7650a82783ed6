//! The scoring seam and its TensorFlow Serving implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::InferenceError;
use crate::preprocess::Tensor;

/// Anything that maps a preprocessed image to one score per class.
#[async_trait]
pub trait ScoreModel: Send + Sync {
    async fn score(&self, input: &Tensor) -> Result<Vec<f32>, InferenceError>;
}

/// Client for a TensorFlow Serving REST endpoint
/// (`POST {endpoint}/v1/models/{name}:predict`).
pub struct ServingModel {
    client: reqwest::Client,
    predict_url: String,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<Vec<Vec<[f32; 3]>>>,
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

impl ServingModel {
    pub fn new(config: &ModelConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build model HTTP client");
        Self {
            client,
            predict_url: format!("{}/v1/models/{}:predict", config.endpoint, config.model_name),
        }
    }
}

#[async_trait]
impl ScoreModel for ServingModel {
    async fn score(&self, input: &Tensor) -> Result<Vec<f32>, InferenceError> {
        let body = PredictRequest {
            instances: vec![input.rows()],
        };
        let response = self.client.post(&self.predict_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(InferenceError::Serving {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PredictResponse = response.json().await?;
        let mut predictions = parsed.predictions.into_iter();
        match (predictions.next(), predictions.next()) {
            (Some(scores), None) => Ok(scores),
            _ => Err(InferenceError::BadOutput(
                "expected exactly one prediction row".to_string(),
            )),
        }
    }
}
