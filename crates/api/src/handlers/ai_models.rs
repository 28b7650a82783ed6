//! Handlers for the `/ai-models` resource: suggestion-provider settings,
//! model selection and prescription suggestions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use retina_core::error::CoreError;
use retina_core::secrets::mask_api_key;
use retina_core::severity::{self, SeverityClass};
use retina_core::suggestions::{
    self, ClinicalPayload, ModelTemplate, PatientInfo, PrescriptionSuggestions, Provider,
    ResultLine,
};
use retina_core::types::{DbId, Timestamp};
use retina_core::validation::{self, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use retina_db::models::ai_model::{AiModelSetting, CreateAiModelSetting, UpdateAiModelSetting};
use retina_db::repositories::{AiModelRepo, DiagnosisRepo, UserRepo};
use retina_db::DbPool;
use retina_inference::SuggestionRequest;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::patients::load_owned_patient;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A model setting as returned to clients. The key is never sent in clear.
#[derive(Debug, Serialize)]
pub struct AiModelResponse {
    pub id: DbId,
    pub provider_name: String,
    pub base_url: Option<String>,
    pub model_name: String,
    pub api_key_masked: String,
    pub temperature: f64,
    pub max_tokens: i32,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct AiModelList {
    pub models: Vec<AiModelResponse>,
    pub active_model: Option<AiModelResponse>,
}

/// Request body for `POST /ai-models`.
#[derive(Debug, Deserialize)]
pub struct CreateAiModelRequest {
    pub provider_name: String,
    pub base_url: Option<String>,
    pub model_name: String,
    pub api_key: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
    pub enabled: Option<bool>,
}

/// Request body for `PUT /ai-models/{id}`. A missing or empty `api_key`
/// keeps the stored key.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAiModelRequest {
    pub provider_name: Option<String>,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub model_id: DbId,
}

/// Request body for `POST /ai-models/suggestions`.
///
/// Either `patient_id` or `patient_info` identifies the patient. With a
/// `patient_id` and no `results`, the patient's stored diagnoses are used.
#[derive(Debug, Deserialize)]
pub struct SuggestionsRequest {
    pub patient_id: Option<DbId>,
    pub patient_info: Option<PatientInfo>,
    #[serde(default)]
    pub results: Vec<ResultLine>,
    #[serde(default)]
    pub conclusion: String,
    pub clinical_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub model_id: DbId,
    pub provider_name: String,
    pub model_name: String,
    pub suggestions: PrescriptionSuggestions,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/ai-models
pub async fn list(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<AiModelList>>> {
    let rows = AiModelRepo::list_for_user(&state.pool, auth_user.user_id).await?;
    let active = active_model(&state.pool, auth_user.user_id).await?;

    Ok(Json(DataResponse {
        data: AiModelList {
            models: rows.iter().map(|m| to_response(&state, m)).collect(),
            active_model: active.as_ref().map(|m| to_response(&state, m)),
        },
    }))
}

/// GET /api/v1/ai-models/templates
pub async fn templates(_auth_user: AuthUser) -> Json<DataResponse<Vec<ModelTemplate>>> {
    Json(DataResponse {
        data: suggestions::templates(),
    })
}

/// POST /api/v1/ai-models
pub async fn create(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<CreateAiModelRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<AiModelResponse>>)> {
    let provider = Provider::parse(&input.provider_name)?;
    let base_url = non_empty(input.base_url);
    let temperature = input.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    let max_tokens = input.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    let api_key = input.api_key.trim();
    if api_key.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "api_key is required".into(),
        )));
    }
    validation::validate_model_settings(
        provider.as_str(),
        base_url.as_deref(),
        &input.model_name,
        temperature,
        max_tokens,
    )?;

    let setting = AiModelRepo::create(
        &state.pool,
        &CreateAiModelSetting {
            user_id: auth_user.user_id,
            provider_name: provider.as_str().to_string(),
            base_url,
            model_name: input.model_name.trim().to_string(),
            api_key_encrypted: state.secrets.seal(api_key)?,
            temperature,
            max_tokens,
            enabled: input.enabled.unwrap_or(true),
        },
    )
    .await?;
    tracing::info!(model_id = setting.id, provider = %setting.provider_name, "AI model added");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: to_response(&state, &setting),
        }),
    ))
}

/// PUT /api/v1/ai-models/{id}
pub async fn update(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateAiModelRequest>,
) -> AppResult<Json<DataResponse<AiModelResponse>>> {
    let current = find_owned(&state.pool, auth_user.user_id, id).await?;

    let provider = match input.provider_name.as_deref() {
        Some(name) => Provider::parse(name)?,
        None => Provider::parse(&current.provider_name)?,
    };
    let base_url = match input.base_url {
        Some(url) => non_empty(Some(url)),
        None => current.base_url.clone(),
    };
    let model_name = input
        .model_name
        .as_deref()
        .unwrap_or(&current.model_name)
        .trim()
        .to_string();
    let temperature = input.temperature.unwrap_or(current.temperature);
    let max_tokens = input.max_tokens.unwrap_or(current.max_tokens);
    validation::validate_model_settings(
        provider.as_str(),
        base_url.as_deref(),
        &model_name,
        temperature,
        max_tokens,
    )?;

    let api_key_encrypted = match non_empty(input.api_key) {
        Some(key) => Some(state.secrets.seal(&key)?),
        None => None,
    };

    let updated = AiModelRepo::update(
        &state.pool,
        auth_user.user_id,
        id,
        &UpdateAiModelSetting {
            provider_name: Some(provider.as_str().to_string()),
            base_url,
            model_name: Some(model_name),
            api_key_encrypted,
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            enabled: input.enabled,
        },
    )
    .await?
    .ok_or(AppError::Core(CoreError::NotFound {
        entity: "AI model",
        id,
    }))?;

    Ok(Json(DataResponse {
        data: to_response(&state, &updated),
    }))
}

/// DELETE /api/v1/ai-models/{id}
pub async fn delete(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let deleted = AiModelRepo::delete(&state.pool, auth_user.user_id, id).await?;
    if !deleted {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "AI model",
            id,
        }));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/ai-models/select
pub async fn select(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<SelectModelRequest>,
) -> AppResult<Json<DataResponse<AiModelResponse>>> {
    let setting = find_owned(&state.pool, auth_user.user_id, input.model_id).await?;
    if !setting.enabled {
        return Err(AppError::Core(CoreError::Validation(
            "Cannot select a disabled model".into(),
        )));
    }
    UserRepo::set_last_selected_model(&state.pool, auth_user.user_id, Some(setting.id)).await?;

    Ok(Json(DataResponse {
        data: to_response(&state, &setting),
    }))
}

/// POST /api/v1/ai-models/suggestions
///
/// Ask the active model for treatment suggestions on a case.
pub async fn suggestions(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<SuggestionsRequest>,
) -> AppResult<Json<DataResponse<SuggestionsResponse>>> {
    let model = active_model(&state.pool, auth_user.user_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Unavailable(
                "No AI model is configured. Add one in settings.".into(),
            ))
        })?;

    let payload = build_payload(&state.pool, auth_user.user_id, input).await?;

    let request = SuggestionRequest {
        provider: Provider::parse(&model.provider_name)?,
        base_url: model.base_url.clone(),
        model_name: model.model_name.clone(),
        api_key: state.secrets.open(&model.api_key_encrypted)?,
        temperature: model.temperature,
        max_tokens: model.max_tokens,
    };
    let suggestions = state.suggestions.generate(&request, &payload).await?;

    Ok(Json(DataResponse {
        data: SuggestionsResponse {
            model_id: model.id,
            provider_name: model.provider_name,
            model_name: model.model_name,
            suggestions,
        },
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn to_response(state: &AppState, m: &AiModelSetting) -> AiModelResponse {
    let api_key_masked = match state.secrets.open(&m.api_key_encrypted) {
        Ok(key) => mask_api_key(&key),
        Err(e) => {
            tracing::warn!(model_id = m.id, error = %e, "Stored API key could not be opened");
            String::new()
        }
    };
    AiModelResponse {
        id: m.id,
        provider_name: m.provider_name.clone(),
        base_url: m.base_url.clone(),
        model_name: m.model_name.clone(),
        api_key_masked,
        temperature: m.temperature,
        max_tokens: m.max_tokens,
        enabled: m.enabled,
        created_at: m.created_at,
        updated_at: m.updated_at,
    }
}

async fn find_owned(pool: &DbPool, user_id: DbId, id: DbId) -> AppResult<AiModelSetting> {
    AiModelRepo::find_for_user(pool, user_id, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "AI model",
            id,
        }))
}

/// The user's selected model if it is still enabled, otherwise the oldest
/// enabled one.
async fn active_model(pool: &DbPool, user_id: DbId) -> AppResult<Option<AiModelSetting>> {
    let selected = UserRepo::find_by_id(pool, user_id)
        .await?
        .and_then(|u| u.last_selected_model_id);
    if let Some(id) = selected {
        if let Some(m) = AiModelRepo::find_for_user(pool, user_id, id).await? {
            if m.enabled {
                return Ok(Some(m));
            }
        }
    }
    Ok(AiModelRepo::first_enabled(pool, user_id).await?)
}

async fn build_payload(
    pool: &DbPool,
    user_id: DbId,
    input: SuggestionsRequest,
) -> AppResult<ClinicalPayload> {
    let mut results = input.results;
    let mut conclusion = input.conclusion.trim().to_string();

    let patient_info = match (input.patient_id, input.patient_info) {
        (Some(patient_id), info) => {
            let patient = load_owned_patient(pool, user_id, patient_id).await?;
            if results.is_empty() {
                let stored = DiagnosisRepo::list_for_patient(pool, patient_id).await?;
                results = stored
                    .iter()
                    .map(|d| ResultLine {
                        class_name: d.class_name.clone(),
                        confidence_percent: d.confidence_percent,
                    })
                    .collect();
            }
            info.unwrap_or(PatientInfo {
                first_name: patient.first_name,
                last_name: patient.last_name,
                age: patient.age,
                gender: patient.gender,
            })
        }
        (None, Some(info)) => info,
        (None, None) => PatientInfo::default(),
    };

    if patient_info.first_name.trim().is_empty() && patient_info.last_name.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Patient name is required".into(),
        )));
    }
    if conclusion.is_empty() {
        let worst = severity::worst(
            results
                .iter()
                .filter_map(|r| SeverityClass::from_label(&r.class_name).ok()),
        );
        if let Some(class) = worst {
            conclusion = class.conclusion().to_string();
        }
    }

    Ok(ClinicalPayload {
        patient_info,
        results,
        conclusion,
        clinical_notes: non_empty(input.clinical_notes),
    })
}
