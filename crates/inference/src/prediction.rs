//! Mapping raw class scores onto a severity grade.

use std::collections::BTreeMap;

use retina_core::severity::{SeverityClass, CLASS_COUNT};
use serde::Serialize;

use crate::error::InferenceError;

/// Outcome of scoring one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class_id: i16,
    pub class_name: String,
    /// Top score, as returned by the model.
    pub confidence: f64,
    /// `confidence * 100`, rounded to two decimals.
    pub confidence_percent: f64,
    /// Score for every class, keyed by label.
    pub all_predictions: BTreeMap<String, f64>,
}

impl Prediction {
    /// Requires exactly one finite score per severity class. Ties resolve
    /// to the lower class index.
    pub fn from_scores(scores: &[f32]) -> Result<Self, InferenceError> {
        if scores.len() != CLASS_COUNT {
            return Err(InferenceError::BadOutput(format!(
                "expected {CLASS_COUNT} scores, got {}",
                scores.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(InferenceError::BadOutput(
                "scores contain NaN or Inf".to_string(),
            ));
        }

        let mut best = 0;
        for (i, &score) in scores.iter().enumerate() {
            if score > scores[best] {
                best = i;
            }
        }
        let class = SeverityClass::from_index(best)
            .ok_or_else(|| InferenceError::BadOutput(format!("class index {best}")))?;
        let confidence = f64::from(scores[best]);

        Ok(Self {
            class_id: best as i16,
            class_name: class.label().to_string(),
            confidence,
            confidence_percent: round2(confidence * 100.0),
            all_predictions: SeverityClass::ALL
                .iter()
                .zip(scores)
                .map(|(c, &s)| (c.label().to_string(), f64::from(s)))
                .collect(),
        })
    }

    pub fn severity(&self) -> Option<SeverityClass> {
        SeverityClass::from_index(self.class_id as usize)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
