//! Handlers for the `/patients` resource.
//!
//! Every patient belongs to the physician who registered it; other users get
//! 403 on direct access and never see the row in lists or searches.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use retina_core::error::CoreError;
use retina_core::severity::{PatientStatus, SeverityClass};
use retina_core::types::{DbId, Timestamp};
use retina_core::validation;
use retina_db::models::diagnosis::Diagnosis;
use retina_db::models::patient::{CreatePatient, Patient, UpdatePatient};
use retina_db::repositories::{DiagnosisRepo, PatientRepo};
use retina_db::DbPool;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::SearchParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// Request body for `POST /patients/check-medical-id`.
#[derive(Debug, Deserialize)]
pub struct CheckMedicalIdRequest {
    pub medical_id: String,
    pub exclude_id: Option<DbId>,
}

#[derive(Debug, Serialize)]
pub struct MedicalIdCheck {
    pub exists: bool,
}

/// Compact diagnosis line embedded in patient list items.
#[derive(Debug, Serialize)]
pub struct DiagnosisSummary {
    pub id: DbId,
    pub class_name: String,
    pub confidence_percent: f64,
    pub created_at: Timestamp,
}

impl From<&Diagnosis> for DiagnosisSummary {
    fn from(d: &Diagnosis) -> Self {
        Self {
            id: d.id,
            class_name: d.class_name.clone(),
            confidence_percent: d.confidence_percent,
            created_at: d.created_at,
        }
    }
}

/// A patient with their status and diagnoses, newest first.
#[derive(Debug, Serialize)]
pub struct PatientListItem {
    #[serde(flatten)]
    pub patient: Patient,
    pub latest_class_name: Option<String>,
    pub status: PatientStatus,
    pub diagnoses: Vec<DiagnosisSummary>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/patients?status=healthy|at_risk|critical|new
pub async fn list(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<DataResponse<Vec<PatientListItem>>>> {
    let filter = params
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PatientStatus::parse)
        .transpose()?;

    let patients = PatientRepo::list_with_latest(&state.pool, auth_user.user_id).await?;
    let mut by_patient: HashMap<DbId, Vec<DiagnosisSummary>> = HashMap::new();
    for d in DiagnosisRepo::list_for_user(&state.pool, auth_user.user_id).await? {
        by_patient
            .entry(d.patient_id)
            .or_default()
            .push(DiagnosisSummary::from(&d));
    }

    let mut items = Vec::with_capacity(patients.len());
    for row in patients {
        let latest = latest_class(row.latest_class_name.as_deref());
        if filter.is_some_and(|f| !f.matches(latest)) {
            continue;
        }
        let diagnoses = by_patient.remove(&row.patient.id).unwrap_or_default();
        items.push(PatientListItem {
            status: PatientStatus::of(latest),
            patient: row.patient,
            latest_class_name: row.latest_class_name,
            diagnoses,
        });
    }

    Ok(Json(DataResponse { data: items }))
}

/// POST /api/v1/patients
pub async fn create(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<CreatePatient>,
) -> AppResult<(StatusCode, Json<DataResponse<Patient>>)> {
    validation::validate_patient(&input.first_name, &input.medical_id, input.age)?;
    ensure_medical_id_free(&state.pool, auth_user.user_id, &input.medical_id, None).await?;

    let patient = PatientRepo::create(&state.pool, auth_user.user_id, &input).await?;
    tracing::info!(patient_id = patient.id, user_id = auth_user.user_id, "Patient created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: patient })))
}

/// GET /api/v1/patients/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Patient>>> {
    let patient = load_owned_patient(&state.pool, auth_user.user_id, id).await?;
    Ok(Json(DataResponse { data: patient }))
}

/// PUT /api/v1/patients/{id}
pub async fn update(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<UpdatePatient>,
) -> AppResult<Json<DataResponse<Patient>>> {
    let current = load_owned_patient(&state.pool, auth_user.user_id, id).await?;

    validation::validate_patient(
        input.first_name.as_deref().unwrap_or(&current.first_name),
        input.medical_id.as_deref().unwrap_or(&current.medical_id),
        input.age.unwrap_or(current.age),
    )?;
    if let Some(medical_id) = input.medical_id.as_deref() {
        if medical_id.trim() != current.medical_id {
            ensure_medical_id_free(&state.pool, auth_user.user_id, medical_id, Some(id)).await?;
        }
    }

    let patient = PatientRepo::update(&state.pool, id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Patient",
            id,
        }))?;
    Ok(Json(DataResponse { data: patient }))
}

/// DELETE /api/v1/patients/{id}
///
/// Removes the patient and, by cascade, their diagnoses.
pub async fn delete(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    load_owned_patient(&state.pool, auth_user.user_id, id).await?;
    PatientRepo::delete(&state.pool, id).await?;
    tracing::info!(patient_id = id, user_id = auth_user.user_id, "Patient deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/patients/search?q=&limit=
pub async fn search(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<DataResponse<Vec<Patient>>>> {
    let term = params.q.as_deref().map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return Ok(Json(DataResponse { data: Vec::new() }));
    }
    let patients = PatientRepo::search(&state.pool, auth_user.user_id, term, params.limit).await?;
    Ok(Json(DataResponse { data: patients }))
}

/// POST /api/v1/patients/check-medical-id
///
/// `exclude_id` lets an edit form ignore the patient being edited.
pub async fn check_medical_id(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<CheckMedicalIdRequest>,
) -> AppResult<Json<MedicalIdCheck>> {
    let medical_id = input.medical_id.trim();
    if medical_id.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "medical_id is required".into(),
        )));
    }
    let exists = PatientRepo::medical_id_exists(
        &state.pool,
        auth_user.user_id,
        medical_id,
        input.exclude_id,
    )
    .await?;
    Ok(Json(MedicalIdCheck { exists }))
}

/// GET /api/v1/patients/{id}/diagnoses
pub async fn diagnoses(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Diagnosis>>>> {
    load_owned_patient(&state.pool, auth_user.user_id, id).await?;
    let rows = DiagnosisRepo::list_for_patient(&state.pool, id).await?;
    Ok(Json(DataResponse { data: rows }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load a patient, failing with 404 when missing and 403 when it belongs to
/// another user.
pub(crate) async fn load_owned_patient(
    pool: &DbPool,
    user_id: DbId,
    id: DbId,
) -> AppResult<Patient> {
    let patient = PatientRepo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Patient",
            id,
        }))?;
    if patient.user_id != user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "You do not have access to this patient".into(),
        )));
    }
    Ok(patient)
}

async fn ensure_medical_id_free(
    pool: &DbPool,
    user_id: DbId,
    medical_id: &str,
    exclude_id: Option<DbId>,
) -> AppResult<()> {
    if PatientRepo::medical_id_exists(pool, user_id, medical_id.trim(), exclude_id).await? {
        return Err(AppError::Core(CoreError::Conflict(
            "Patient ID already exists".into(),
        )));
    }
    Ok(())
}

fn latest_class(name: Option<&str>) -> Option<SeverityClass> {
    name.and_then(|n| SeverityClass::from_label(n).ok())
}
