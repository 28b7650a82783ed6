//! Handlers for image analysis: single, batch and preview.
//!
//! All three accept `multipart/form-data` with one or more `file`/`files`
//! parts plus optional patient fields.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;
use retina_core::error::CoreError;
use retina_core::hashing::sha256_hex;
use retina_core::types::DbId;
use retina_core::uploads::validate_image_filename;
use retina_core::validation;
use retina_db::models::diagnosis::{CreateDiagnosis, Diagnosis};
use retina_db::models::patient::{CreatePatient, Patient};
use retina_db::repositories::{DiagnosisRepo, PatientRepo};
use retina_inference::{InferenceAdapter, Prediction};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::storage::{discard_image, store_image, StoredImage};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// One uploaded file.
struct Upload {
    filename: String,
    bytes: Arc<[u8]>,
}

/// Parsed multipart body.
struct PredictForm {
    uploads: Vec<Upload>,
    fields: HashMap<String, String>,
}

impl PredictForm {
    fn field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Patient fields from the form. An unparseable age is ignored.
    fn patient(&self) -> AppResult<CreatePatient> {
        let patient = CreatePatient {
            first_name: self.field("first_name").unwrap_or_default(),
            last_name: self.field("last_name").unwrap_or_default(),
            age: self.field("age").and_then(|a| a.parse().ok()),
            gender: self.field("gender"),
            email: self.field("email"),
            phone: self.field("phone"),
            medical_id: self.field("medical_id").unwrap_or_default(),
            notes: self.field("notes"),
        };
        validation::validate_patient(&patient.first_name, &patient.medical_id, patient.age)?;
        Ok(patient)
    }
}

/// Result of a persisted single analysis.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub filename: String,
    pub status: &'static str,
    pub patient_id: DbId,
    pub diagnosis_id: DbId,
}

#[derive(Debug, Serialize)]
pub struct ItemSuccess {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub filename: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis_id: Option<DbId>,
}

#[derive(Debug, Serialize)]
pub struct ItemFailure {
    pub filename: String,
    pub status: &'static str,
    pub error: String,
    pub code: &'static str,
}

/// One entry of a batch or preview response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ItemResult {
    Success(ItemSuccess),
    Error(ItemFailure),
}

impl ItemResult {
    fn success(filename: String, prediction: Prediction, diagnosis_id: Option<DbId>) -> Self {
        ItemResult::Success(ItemSuccess {
            prediction,
            filename,
            status: "success",
            diagnosis_id,
        })
    }

    fn failure(filename: String, err: &AppError) -> Self {
        let (_, code, error) = err.classify();
        ItemResult::Error(ItemFailure {
            filename,
            status: "error",
            error,
            code,
        })
    }

    fn is_success(&self) -> bool {
        matches!(self, ItemResult::Success(_))
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub total: usize,
    pub successful: usize,
    pub results: Vec<ItemResult>,
    pub patient_id: DbId,
    pub batch_session_id: Uuid,
    /// First stored diagnosis, for clients that open a single report.
    pub diagnosis_id: Option<DbId>,
    pub diagnosis_ids: Vec<DbId>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub total: usize,
    pub successful: usize,
    pub results: Vec<ItemResult>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/predict
///
/// Analyse one image and record the result against the patient identified by
/// `medical_id`, registering the patient if needed.
pub async fn predict(
    State(state): State<AppState>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<PredictResponse>> {
    let form = read_form(multipart).await?;
    let patient_input = form.patient()?;
    let diagnosis_notes = form.field("diagnosis_notes");
    if form.uploads.len() > 1 {
        return Err(AppError::Core(CoreError::Validation(
            "Single analysis takes exactly one image; use batch-predict for several".into(),
        )));
    }
    let upload = form.uploads.into_iter().next().ok_or_else(no_upload)?;

    let ext = validate_image_filename(&upload.filename)?;
    let classifier = state.classifier()?;
    let prediction = classifier.predict_bytes(Arc::clone(&upload.bytes)).await?;

    let sha256 = sha256_hex(&upload.bytes);
    let image = store_image(&state.config.upload_dir, &sha256, &ext, &upload.bytes).await?;
    let diagnosis_for = |patient_id| {
        new_diagnosis(
            patient_id,
            auth_user.user_id,
            None,
            image.path.clone(),
            &upload.filename,
            sha256.clone(),
            &prediction,
            diagnosis_notes,
        )
    };
    let (patient, diagnosis) =
        match record_single(&state, auth_user.user_id, &patient_input, diagnosis_for).await {
            Ok(recorded) => recorded,
            Err(err) => {
                release_image(&state, &image, &sha256).await;
                return Err(err);
            }
        };

    tracing::info!(
        patient_id = patient.id,
        diagnosis_id = diagnosis.id,
        class = %prediction.class_name,
        "Diagnosis recorded"
    );

    Ok(Json(PredictResponse {
        prediction,
        filename: upload.filename,
        status: "success",
        patient_id: patient.id,
        diagnosis_id: diagnosis.id,
    }))
}

/// POST /api/v1/batch-predict
///
/// Analyse every uploaded image for one patient under a fresh batch session.
/// Failures are reported per file; the response has one result per upload.
pub async fn batch_predict(
    State(state): State<AppState>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<BatchResponse>> {
    let form = read_form(multipart).await?;
    let patient_input = form.patient()?;
    let diagnosis_notes = form.field("diagnosis_notes");
    if form.uploads.is_empty() {
        return Err(no_upload());
    }
    let classifier = state.classifier()?;

    let patient = match PatientRepo::find_by_medical_id(
        &state.pool,
        auth_user.user_id,
        &patient_input.medical_id,
    )
    .await?
    {
        Some(existing) => existing,
        None => PatientRepo::create(&state.pool, auth_user.user_id, &patient_input).await?,
    };
    let batch_session_id = Uuid::new_v4();
    let total = form.uploads.len();
    tracing::info!(
        patient_id = patient.id,
        %batch_session_id,
        total,
        "Batch analysis started"
    );

    let mut results = Vec::with_capacity(total);
    let mut diagnosis_ids = Vec::new();
    for upload in form.uploads {
        let outcome = analyse_and_record(
            &state,
            classifier,
            &patient,
            auth_user.user_id,
            batch_session_id,
            &upload,
            diagnosis_notes.clone(),
        )
        .await;
        match outcome {
            Ok((prediction, diagnosis_id)) => {
                diagnosis_ids.push(diagnosis_id);
                results.push(ItemResult::success(
                    upload.filename,
                    prediction,
                    Some(diagnosis_id),
                ));
            }
            Err(err) => {
                tracing::warn!(filename = %upload.filename, error = %err, "Batch item failed");
                results.push(ItemResult::failure(upload.filename, &err));
            }
        }
    }

    let successful = results.iter().filter(|r| r.is_success()).count();
    tracing::info!(%batch_session_id, total, successful, "Batch analysis finished");

    Ok(Json(BatchResponse {
        total,
        successful,
        results,
        patient_id: patient.id,
        batch_session_id,
        diagnosis_id: diagnosis_ids.first().copied(),
        diagnosis_ids,
    }))
}

/// POST /api/v1/predict/preview
///
/// Classify the uploads without storing anything.
pub async fn preview(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<PreviewResponse>> {
    let form = read_form(multipart).await?;
    if form.uploads.is_empty() {
        return Err(no_upload());
    }
    let classifier = state.classifier()?;

    // Reject bad extensions up front, score the rest in one pass.
    let mut slots: Vec<Result<(), AppError>> = Vec::with_capacity(form.uploads.len());
    let mut accepted = Vec::new();
    for upload in &form.uploads {
        match validate_image_filename(&upload.filename) {
            Ok(_) => {
                accepted.push(Arc::clone(&upload.bytes));
                slots.push(Ok(()));
            }
            Err(e) => slots.push(Err(e.into())),
        }
    }
    let mut scored = classifier.predict_batch(accepted).await.into_iter();

    let mut results = Vec::with_capacity(slots.len());
    for (upload, slot) in form.uploads.into_iter().zip(slots) {
        let outcome = slot.and_then(|()| match scored.next() {
            Some(result) => result.map_err(AppError::from),
            None => Err(AppError::InternalError("Missing batch result".into())),
        });
        results.push(match outcome {
            Ok(prediction) => ItemResult::success(upload.filename, prediction, None),
            Err(err) => ItemResult::failure(upload.filename, &err),
        });
    }

    let successful = results.iter().filter(|r| r.is_success()).count();
    Ok(Json(PreviewResponse {
        total: results.len(),
        successful,
        results,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn no_upload() -> AppError {
    AppError::Core(CoreError::Validation("No image uploaded".into()))
}

/// Drain the multipart stream into uploads and text fields.
async fn read_form(mut multipart: Multipart) -> AppResult<PredictForm> {
    let mut uploads = Vec::new();
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" || name == "files" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
            // Browsers send an empty part when no file was chosen.
            if filename.is_empty() && bytes.is_empty() {
                continue;
            }
            uploads.push(Upload {
                filename,
                bytes: Arc::from(bytes.as_ref()),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            fields.insert(name, value);
        }
    }

    Ok(PredictForm { uploads, fields })
}

/// Run one batch item end to end. A re-upload of an image that already has
/// the same finding for this patient reuses the stored diagnosis.
async fn analyse_and_record(
    state: &AppState,
    classifier: &InferenceAdapter,
    patient: &Patient,
    user_id: DbId,
    batch_session_id: Uuid,
    upload: &Upload,
    notes: Option<String>,
) -> AppResult<(Prediction, DbId)> {
    let ext = validate_image_filename(&upload.filename)?;
    let prediction = classifier.predict_bytes(Arc::clone(&upload.bytes)).await?;
    let sha256 = sha256_hex(&upload.bytes);

    if let Some(existing) = DiagnosisRepo::find_duplicate(
        &state.pool,
        patient.id,
        user_id,
        &sha256,
        &prediction.class_name,
    )
    .await?
    {
        tracing::debug!(diagnosis_id = existing.id, "Reusing diagnosis for duplicate image");
        return Ok((prediction, existing.id));
    }

    let image = store_image(&state.config.upload_dir, &sha256, &ext, &upload.bytes).await?;
    let input = new_diagnosis(
        patient.id,
        user_id,
        Some(batch_session_id),
        image.path.clone(),
        &upload.filename,
        sha256.clone(),
        &prediction,
        notes,
    );
    match DiagnosisRepo::create(&state.pool, &input).await {
        Ok(diagnosis) => Ok((prediction, diagnosis.id)),
        Err(err) => {
            release_image(state, &image, &sha256).await;
            Err(err.into())
        }
    }
}

/// Find or register the patient and insert the diagnosis in one transaction.
async fn record_single(
    state: &AppState,
    user_id: DbId,
    patient_input: &CreatePatient,
    diagnosis_for: impl FnOnce(DbId) -> CreateDiagnosis,
) -> AppResult<(Patient, Diagnosis)> {
    let mut tx = state.pool.begin().await?;
    let patient =
        match PatientRepo::find_by_medical_id(&mut *tx, user_id, &patient_input.medical_id).await? {
            Some(existing) => existing,
            None => PatientRepo::create(&mut *tx, user_id, patient_input).await?,
        };
    let diagnosis = DiagnosisRepo::create(&mut *tx, &diagnosis_for(patient.id)).await?;
    tx.commit().await?;
    Ok((patient, diagnosis))
}

/// Undo `store_image` after a failed insert, unless another diagnosis already
/// points at the same bytes.
async fn release_image(state: &AppState, image: &StoredImage, sha256: &str) {
    if !image.created {
        return;
    }
    match DiagnosisRepo::image_in_use(&state.pool, sha256).await {
        Ok(false) => discard_image(image).await,
        Ok(true) => {}
        Err(e) => tracing::warn!(error = %e, path = %image.path, "Keeping upload, usage check failed"),
    }
}

#[allow(clippy::too_many_arguments)]
fn new_diagnosis(
    patient_id: DbId,
    user_id: DbId,
    batch_session_id: Option<Uuid>,
    image_path: String,
    filename: &str,
    image_sha256: String,
    prediction: &Prediction,
    notes: Option<String>,
) -> CreateDiagnosis {
    CreateDiagnosis {
        patient_id,
        user_id,
        batch_session_id,
        image_path,
        image_filename: filename.to_string(),
        image_sha256,
        class_id: prediction.class_id,
        class_name: prediction.class_name.clone(),
        confidence: prediction.confidence,
        confidence_percent: prediction.confidence_percent,
        all_predictions: prediction.all_predictions.clone(),
        notes,
    }
}
