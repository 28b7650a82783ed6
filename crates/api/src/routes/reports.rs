//! Route definitions for the `/reports` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::reports;
use crate::state::AppState;

/// Routes mounted at `/reports`. Every route accepts `?format=pdf|json`.
///
/// ```text
/// GET  /diagnoses/{id}                      -> diagnosis_report
/// POST /patients/{id}/batch                 -> batch_report
/// GET  /patients/{id}/history               -> history_report
/// GET  /patients/{id}/sessions/{session}    -> session_report
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/diagnoses/{id}", get(reports::diagnosis_report))
        .route("/patients/{id}/batch", post(reports::batch_report))
        .route("/patients/{id}/history", get(reports::history_report))
        .route(
            "/patients/{id}/sessions/{session}",
            get(reports::session_report),
        )
}
