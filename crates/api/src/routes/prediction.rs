//! Route definitions for image analysis.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::prediction;
use crate::state::AppState;

/// Analysis routes, merged at the API root.
///
/// ```text
/// POST /predict          -> predict (multipart)
/// POST /batch-predict    -> batch_predict (multipart)
/// POST /predict/preview  -> preview (multipart)
/// ```
///
/// Uploads may be up to `max_upload_bytes` per request.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/predict", post(prediction::predict))
        .route("/batch-predict", post(prediction::batch_predict))
        .route("/predict/preview", post(prediction::preview))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
