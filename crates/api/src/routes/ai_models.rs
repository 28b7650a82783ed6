//! Route definitions for the `/ai-models` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::ai_models;
use crate::state::AppState;

/// Routes mounted at `/ai-models`.
///
/// ```text
/// GET    /              -> list
/// POST   /              -> create
/// GET    /templates     -> templates
/// POST   /select        -> select
/// POST   /suggestions   -> suggestions
/// PUT    /{id}          -> update
/// DELETE /{id}          -> delete
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(ai_models::list).post(ai_models::create))
        .route("/templates", get(ai_models::templates))
        .route("/select", post(ai_models::select))
        .route("/suggestions", post(ai_models::suggestions))
        .route("/{id}", put(ai_models::update).delete(ai_models::delete))
}
