//! Diagnosis entity model and DTOs.
//!
//! Diagnoses are append-only: there is no update DTO.

use retina_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Class label to score, as produced by the classifier.
pub type ClassScores = std::collections::BTreeMap<String, f64>;

/// A row from the `diagnoses` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Diagnosis {
    pub id: DbId,
    pub patient_id: DbId,
    pub user_id: DbId,
    pub batch_session_id: Option<Uuid>,
    pub image_path: String,
    pub image_filename: String,
    pub image_sha256: String,
    pub class_id: i16,
    pub class_name: String,
    pub confidence: f64,
    pub confidence_percent: f64,
    pub all_predictions: Json<ClassScores>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for recording one analysed image.
#[derive(Debug, Clone)]
pub struct CreateDiagnosis {
    pub patient_id: DbId,
    pub user_id: DbId,
    pub batch_session_id: Option<Uuid>,
    pub image_path: String,
    pub image_filename: String,
    pub image_sha256: String,
    pub class_id: i16,
    pub class_name: String,
    pub confidence: f64,
    pub confidence_percent: f64,
    pub all_predictions: ClassScores,
    pub notes: Option<String>,
}
