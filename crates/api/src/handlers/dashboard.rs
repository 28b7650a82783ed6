//! Dashboard aggregates for the signed-in physician.

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use retina_core::analytics::{self, Distribution, GrowthMode, GrowthSeries};
use retina_core::severity::SeverityClass;
use retina_db::repositories::{DiagnosisRepo, PatientRepo};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_patients: usize,
    pub total_diagnoses: usize,
    pub distribution: Distribution,
    pub growth: GrowthSeries,
}

/// `?mode=all|year|month&year=YYYY&month=YYYY-MM`
#[derive(Debug, Deserialize)]
pub struct ChartParams {
    pub mode: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
}

/// GET /api/v1/dashboard
pub async fn summary(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<DashboardSummary>>> {
    let patients = PatientRepo::list_with_latest(&state.pool, auth_user.user_id).await?;
    let distribution = analytics::distribution(patients.iter().map(|p| {
        p.latest_class_name
            .as_deref()
            .and_then(|n| SeverityClass::from_label(n).ok())
    }));

    let patient_created = PatientRepo::created_timestamps(&state.pool, auth_user.user_id).await?;
    let diagnosis_created =
        DiagnosisRepo::created_timestamps(&state.pool, auth_user.user_id).await?;
    let growth = analytics::growth_series(
        GrowthMode::All,
        &patient_created,
        &diagnosis_created,
        Utc::now().date_naive(),
    );

    Ok(Json(DataResponse {
        data: DashboardSummary {
            total_patients: patients.len(),
            total_diagnoses: diagnosis_created.len(),
            distribution,
            growth,
        },
    }))
}

/// GET /api/v1/dashboard/chart-data
pub async fn chart_data(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<ChartParams>,
) -> AppResult<Json<DataResponse<GrowthSeries>>> {
    let today = Utc::now().date_naive();
    let mode = GrowthMode::parse(
        params.mode.as_deref(),
        params.year.as_deref(),
        params.month.as_deref(),
        today,
    );

    let patient_created = PatientRepo::created_timestamps(&state.pool, auth_user.user_id).await?;
    let diagnosis_created =
        DiagnosisRepo::created_timestamps(&state.pool, auth_user.user_id).await?;

    Ok(Json(DataResponse {
        data: analytics::growth_series(mode, &patient_created, &diagnosis_created, today),
    }))
}
