//! Report downloads. Each endpoint answers with a PDF attachment by default
//! or the underlying document with `?format=json`.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use retina_core::error::CoreError;
use retina_core::types::DbId;
use retina_db::models::user::User;
use retina_db::repositories::{DiagnosisRepo, UserRepo};
use retina_db::DbPool;
use retina_report::{render_pdf, ReportDocument};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::patients::load_owned_patient;
use crate::middleware::auth::AuthUser;
use crate::query::{FormatParams, ReportFormat};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /reports/patients/{id}/batch`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchReportRequest {
    /// Diagnoses to include. Empty means every diagnosis of the patient.
    #[serde(default)]
    pub diagnosis_ids: Vec<DbId>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/reports/diagnoses/{id}
pub async fn diagnosis_report(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
    Query(params): Query<FormatParams>,
) -> AppResult<Response> {
    let format = params.report_format()?;
    let diagnosis = DiagnosisRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Diagnosis",
            id,
        }))?;
    if diagnosis.user_id != auth_user.user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "You do not have access to this diagnosis".into(),
        )));
    }

    let patient = load_owned_patient(&state.pool, auth_user.user_id, diagnosis.patient_id).await?;
    let physician = load_physician(&state.pool, auth_user.user_id).await?;
    let doc = ReportDocument::diagnostic(&patient, &physician, &[diagnosis], Utc::now());
    respond(doc, format).await
}

/// POST /api/v1/reports/patients/{id}/batch
///
/// Report over the chosen diagnoses, oldest first.
pub async fn batch_report(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(patient_id): Path<DbId>,
    Query(params): Query<FormatParams>,
    Json(input): Json<BatchReportRequest>,
) -> AppResult<Response> {
    let format = params.report_format()?;
    let patient = load_owned_patient(&state.pool, auth_user.user_id, patient_id).await?;

    let mut diagnoses = if input.diagnosis_ids.is_empty() {
        DiagnosisRepo::list_for_patient(&state.pool, patient_id).await?
    } else {
        DiagnosisRepo::list_by_ids_for_patient(&state.pool, patient_id, &input.diagnosis_ids)
            .await?
    };
    if input.diagnosis_ids.is_empty() {
        diagnoses.reverse();
    }
    if diagnoses.is_empty() {
        return Err(no_diagnoses(patient_id));
    }

    let physician = load_physician(&state.pool, auth_user.user_id).await?;
    let doc = ReportDocument::diagnostic(&patient, &physician, &diagnoses, Utc::now());
    respond(doc, format).await
}

/// GET /api/v1/reports/patients/{id}/history
pub async fn history_report(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(patient_id): Path<DbId>,
    Query(params): Query<FormatParams>,
) -> AppResult<Response> {
    let format = params.report_format()?;
    let patient = load_owned_patient(&state.pool, auth_user.user_id, patient_id).await?;
    let diagnoses = DiagnosisRepo::list_for_patient(&state.pool, patient_id).await?;
    if diagnoses.is_empty() {
        return Err(no_diagnoses(patient_id));
    }

    let physician = load_physician(&state.pool, auth_user.user_id).await?;
    let doc = ReportDocument::history(&patient, &physician, &diagnoses, Utc::now());
    respond(doc, format).await
}

/// GET /api/v1/reports/patients/{id}/sessions/{session}
pub async fn session_report(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path((patient_id, session_id)): Path<(DbId, Uuid)>,
    Query(params): Query<FormatParams>,
) -> AppResult<Response> {
    let format = params.report_format()?;
    let patient = load_owned_patient(&state.pool, auth_user.user_id, patient_id).await?;
    let diagnoses = DiagnosisRepo::list_for_batch_session(&state.pool, patient_id, session_id).await?;
    if diagnoses.is_empty() {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Batch session for patient",
            id: patient_id,
        }));
    }

    let physician = load_physician(&state.pool, auth_user.user_id).await?;
    let doc =
        ReportDocument::batch_session(&patient, &physician, session_id, &diagnoses, Utc::now());
    respond(doc, format).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 404 for a report over a patient with nothing analysed yet.
fn no_diagnoses(patient_id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Diagnoses for patient",
        id: patient_id,
    })
}

async fn load_physician(pool: &DbPool, user_id: DbId) -> AppResult<User> {
    UserRepo::find_by_id(pool, user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "User",
            id: user_id,
        }))
}

async fn respond(doc: ReportDocument, format: ReportFormat) -> AppResult<Response> {
    if format == ReportFormat::Json {
        return Ok(Json(DataResponse { data: doc }).into_response());
    }

    let file_name = doc.file_name();
    let pdf = tokio::task::spawn_blocking(move || render_pdf(&doc))
        .await
        .map_err(|e| AppError::InternalError(format!("Report task failed: {e}")))??;
    tracing::debug!(file_name = %file_name, bytes = pdf.len(), "Report rendered");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        pdf,
    )
        .into_response())
}
