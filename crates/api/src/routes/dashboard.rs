//! Route definitions for the `/dashboard` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::dashboard;
use crate::state::AppState;

/// Routes mounted at `/dashboard`.
///
/// ```text
/// GET /             -> summary
/// GET /chart-data   -> chart_data (?mode=&year=&month=)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard::summary))
        .route("/chart-data", get(dashboard::chart_data))
}
