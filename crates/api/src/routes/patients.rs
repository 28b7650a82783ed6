//! Route definitions for the `/patients` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::patients;
use crate::state::AppState;

/// Routes mounted at `/patients`.
///
/// ```text
/// GET    /                    -> list (?status=)
/// POST   /                    -> create
/// GET    /search              -> search (?q=&limit=)
/// POST   /check-medical-id    -> check_medical_id
/// GET    /{id}                -> get_by_id
/// PUT    /{id}                -> update
/// DELETE /{id}                -> delete
/// GET    /{id}/diagnoses      -> diagnoses
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(patients::list).post(patients::create))
        .route("/search", get(patients::search))
        .route("/check-medical-id", post(patients::check_medical_id))
        .route(
            "/{id}",
            get(patients::get_by_id)
                .put(patients::update)
                .delete(patients::delete),
        )
        .route("/{id}/diagnoses", get(patients::diagnoses))
}
