//! Repository for the `patients` table.
//!
//! Every query is scoped by owning user except [`PatientRepo::find_by_id`],
//! which handlers use to tell "not yours" (403) from "does not exist" (404).

use retina_core::types::{DbId, Timestamp};
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;

use crate::models::patient::{CreatePatient, Patient, PatientWithLatest, UpdatePatient};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, first_name, last_name, age, gender, email, phone, \
                        medical_id, notes, created_at, updated_at";

/// Default number of rows returned by [`PatientRepo::search`].
pub const DEFAULT_SEARCH_LIMIT: i64 = 6;
const MAX_SEARCH_LIMIT: i64 = 50;

/// Provides CRUD operations for patients.
pub struct PatientRepo;

impl PatientRepo {
    /// Insert a patient owned by `user_id`. Fields are stored trimmed.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        user_id: DbId,
        input: &CreatePatient,
    ) -> Result<Patient, sqlx::Error> {
        let query = format!(
            "INSERT INTO patients (user_id, first_name, last_name, age, gender, email, phone,
                                   medical_id, notes)
             VALUES ($1, btrim($2), btrim($3), $4, $5, $6, $7, btrim($8), $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Patient>(&query)
            .bind(user_id)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(input.age)
            .bind(&input.gender)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.medical_id)
            .bind(&input.notes)
            .fetch_one(executor)
            .await
    }

    /// Find a patient by ID regardless of owner.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Patient>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM patients WHERE id = $1");
        sqlx::query_as::<_, Patient>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find one of `user_id`'s patients by medical ID.
    pub async fn find_by_medical_id<'e>(
        executor: impl PgExecutor<'e>,
        user_id: DbId,
        medical_id: &str,
    ) -> Result<Option<Patient>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM patients WHERE user_id = $1 AND medical_id = btrim($2)");
        sqlx::query_as::<_, Patient>(&query)
            .bind(user_id)
            .bind(medical_id)
            .fetch_optional(executor)
            .await
    }

    /// All of `user_id`'s patients, newest first, each with the class of
    /// their most recent diagnosis.
    pub async fn list_with_latest(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<PatientWithLatest>, sqlx::Error> {
        const QUERY: &str = "SELECT p.id, p.user_id, p.first_name, p.last_name, p.age, p.gender, p.email,
                    p.phone, p.medical_id, p.notes, p.created_at, p.updated_at,
                    latest.class_name AS latest_class_name
             FROM patients p
             LEFT JOIN LATERAL (
                 SELECT d.class_name FROM diagnoses d
                 WHERE d.patient_id = p.id
                 ORDER BY d.created_at DESC, d.id DESC
                 LIMIT 1
             ) latest ON true
             WHERE p.user_id = $1
             ORDER BY p.created_at DESC, p.id DESC";
        sqlx::query_as::<_, PatientWithLatest>(QUERY)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Update a patient. Omitted fields are kept; optional columns given as
    /// `Some(None)` are cleared.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdatePatient,
    ) -> Result<Option<Patient>, sqlx::Error> {
        let query = format!(
            "UPDATE patients SET
                first_name = COALESCE(btrim($2), first_name),
                last_name = COALESCE(btrim($3), last_name),
                age = CASE WHEN $4 THEN $5 ELSE age END,
                gender = CASE WHEN $6 THEN $7 ELSE gender END,
                email = CASE WHEN $8 THEN $9 ELSE email END,
                phone = CASE WHEN $10 THEN $11 ELSE phone END,
                medical_id = COALESCE(btrim($12), medical_id),
                notes = CASE WHEN $13 THEN $14 ELSE notes END
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Patient>(&query)
            .bind(id)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(input.age.is_some())
            .bind(input.age.flatten())
            .bind(input.gender.is_some())
            .bind(nullable(&input.gender))
            .bind(input.email.is_some())
            .bind(nullable(&input.email))
            .bind(input.phone.is_some())
            .bind(nullable(&input.phone))
            .bind(&input.medical_id)
            .bind(input.notes.is_some())
            .bind(nullable(&input.notes))
            .fetch_optional(pool)
            .await
    }

    /// Delete a patient and, through the foreign key, their diagnoses.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Case-insensitive substring search over medical ID, names, full name
    /// and phone.
    pub async fn search(
        pool: &PgPool,
        user_id: DbId,
        term: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Patient>, sqlx::Error> {
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        let pattern = format!("%{}%", escape_like(term.trim()));
        let query = format!(
            "SELECT {COLUMNS} FROM patients
             WHERE user_id = $1
               AND (medical_id ILIKE $2
                    OR first_name ILIKE $2
                    OR last_name ILIKE $2
                    OR phone ILIKE $2
                    OR (first_name || ' ' || last_name) ILIKE $2)
             ORDER BY first_name, last_name, id
             LIMIT $3"
        );
        sqlx::query_as::<_, Patient>(&query)
            .bind(user_id)
            .bind(pattern)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Whether `user_id` already has a patient with `medical_id`, ignoring
    /// `exclude_id` (the patient being edited).
    pub async fn medical_id_exists(
        pool: &PgPool,
        user_id: DbId,
        medical_id: &str,
        exclude_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM patients
                 WHERE user_id = $1 AND medical_id = btrim($2)
                   AND ($3::BIGINT IS NULL OR id <> $3)
             )",
        )
        .bind(user_id)
        .bind(medical_id)
        .bind(exclude_id)
        .fetch_one(pool)
        .await
    }

    /// Registration timestamps of `user_id`'s patients, oldest first.
    pub async fn created_timestamps(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<Timestamp>, sqlx::Error> {
        sqlx::query_scalar::<_, Timestamp>(
            "SELECT created_at FROM patients WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// New value of a nullable text column; `None` writes NULL.
fn nullable(field: &Option<Option<String>>) -> Option<&str> {
    field.as_ref().and_then(|v| v.as_deref())
}
