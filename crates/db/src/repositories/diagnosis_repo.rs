//! Repository for the `diagnoses` table.
//!
//! Rows are append-only; there is no update method and the table rejects
//! UPDATE statements.

use retina_core::types::{DbId, Timestamp};
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::diagnosis::{CreateDiagnosis, Diagnosis};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, patient_id, user_id, batch_session_id, image_path, image_filename, \
                        image_sha256, class_id, class_name, confidence, confidence_percent, \
                        all_predictions, notes, created_at";

/// Provides insert and read operations for diagnoses.
pub struct DiagnosisRepo;

impl DiagnosisRepo {
    /// Record one analysed image.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        input: &CreateDiagnosis,
    ) -> Result<Diagnosis, sqlx::Error> {
        let query = format!(
            "INSERT INTO diagnoses (patient_id, user_id, batch_session_id, image_path,
                                    image_filename, image_sha256, class_id, class_name,
                                    confidence, confidence_percent, all_predictions, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Diagnosis>(&query)
            .bind(input.patient_id)
            .bind(input.user_id)
            .bind(input.batch_session_id)
            .bind(&input.image_path)
            .bind(&input.image_filename)
            .bind(&input.image_sha256)
            .bind(input.class_id)
            .bind(&input.class_name)
            .bind(input.confidence)
            .bind(input.confidence_percent)
            .bind(Json(&input.all_predictions))
            .bind(&input.notes)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Diagnosis>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM diagnoses WHERE id = $1");
        sqlx::query_as::<_, Diagnosis>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Whether any diagnosis, of any user, points at the image with this digest.
    pub async fn image_in_use(pool: &PgPool, image_sha256: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM diagnoses WHERE image_sha256 = $1)")
            .bind(image_sha256)
            .fetch_one(pool)
            .await
    }

    /// An earlier diagnosis of the same image bytes with the same outcome.
    pub async fn find_duplicate<'e>(
        executor: impl PgExecutor<'e>,
        patient_id: DbId,
        user_id: DbId,
        image_sha256: &str,
        class_name: &str,
    ) -> Result<Option<Diagnosis>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM diagnoses
             WHERE patient_id = $1 AND user_id = $2 AND image_sha256 = $3 AND class_name = $4
             ORDER BY id
             LIMIT 1"
        );
        sqlx::query_as::<_, Diagnosis>(&query)
            .bind(patient_id)
            .bind(user_id)
            .bind(image_sha256)
            .bind(class_name)
            .fetch_optional(executor)
            .await
    }

    /// A patient's diagnoses, newest first.
    pub async fn list_for_patient(
        pool: &PgPool,
        patient_id: DbId,
    ) -> Result<Vec<Diagnosis>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM diagnoses
             WHERE patient_id = $1
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Diagnosis>(&query)
            .bind(patient_id)
            .fetch_all(pool)
            .await
    }

    /// The subset of a patient's diagnoses named in `ids`, oldest first.
    /// IDs belonging to other patients are ignored.
    pub async fn list_by_ids_for_patient(
        pool: &PgPool,
        patient_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<Diagnosis>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM diagnoses
             WHERE patient_id = $1 AND id = ANY($2)
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, Diagnosis>(&query)
            .bind(patient_id)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Diagnoses written by one batch analysis, in upload order.
    pub async fn list_for_batch_session(
        pool: &PgPool,
        patient_id: DbId,
        batch_session_id: Uuid,
    ) -> Result<Vec<Diagnosis>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM diagnoses
             WHERE patient_id = $1 AND batch_session_id = $2
             ORDER BY id"
        );
        sqlx::query_as::<_, Diagnosis>(&query)
            .bind(patient_id)
            .bind(batch_session_id)
            .fetch_all(pool)
            .await
    }

    /// Every diagnosis recorded by `user_id`, newest first.
    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Diagnosis>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM diagnoses
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Diagnosis>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Creation timestamps of `user_id`'s diagnoses, oldest first.
    pub async fn created_timestamps(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<Timestamp>, sqlx::Error> {
        sqlx::query_scalar::<_, Timestamp>(
            "SELECT created_at FROM diagnoses WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
