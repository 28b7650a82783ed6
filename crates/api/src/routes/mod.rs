pub mod account;
pub mod ai_models;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod patients;
pub mod prediction;
pub mod reports;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/signup                                 start signup, email OTP (public)
/// /auth/signup/verify                          verify OTP, sign in (public)
/// /auth/signup/resend                          reissue signup OTP (public)
/// /auth/login                                  login (public)
/// /auth/refresh                                refresh (public)
/// /auth/logout                                 logout (requires auth)
/// /auth/password-reset                         email reset code (public)
/// /auth/password-reset/confirm                 set new password (public)
///
/// /account                                     get, update, deactivate
/// /account/password                            change password (POST)
///
/// /patients                                    list (?status=), create
/// /patients/search                             search (?q=&limit=)
/// /patients/check-medical-id                   medical ID availability (POST)
/// /patients/{id}                               get, update, delete
/// /patients/{id}/diagnoses                     diagnosis history
///
/// /predict                                     single analysis (multipart)
/// /batch-predict                               batch analysis (multipart)
/// /predict/preview                             inference only (multipart)
///
/// /reports/diagnoses/{id}                      single-diagnosis report
/// /reports/patients/{id}/batch                 chosen diagnoses (POST)
/// /reports/patients/{id}/history               history report
/// /reports/patients/{id}/sessions/{session}    batch session report
///
/// /ai-models                                   list (+active), create
/// /ai-models/templates                         provider templates
/// /ai-models/select                            set active model (POST)
/// /ai-models/suggestions                       generate suggestions (POST)
/// /ai-models/{id}                              update, delete
///
/// /dashboard                                   distribution + growth
/// /dashboard/chart-data                        growth series (?mode=)
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/account", account::router())
        .nest("/patients", patients::router())
        .merge(prediction::router(config.max_upload_bytes))
        .nest("/reports", reports::router())
        .nest("/ai-models", ai_models::router())
        .nest("/dashboard", dashboard::router())
}
