use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use retina_core::error::CoreError;
use retina_core::secrets::SecretError;
use retina_events::EmailError;
use retina_inference::{InferenceError, ProviderError};
use retina_report::ReportError;
use serde_json::json;

/// Everything a handler can fail with. Rendered as
/// `{ "error": <message>, "code": <CODE> }` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Preprocessing or model scoring failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// No classifier endpoint is configured.
    #[error("Model not loaded")]
    ModelUnavailable,

    /// A one-time code could not be delivered.
    #[error(transparent)]
    Email(#[from] EmailError),

    /// A prescription-suggestion provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Logged in full; the client only sees a generic message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Stable machine-readable code, as rendered in the `code` field.
    pub fn code(&self) -> &'static str {
        self.classify().1
    }

    /// Status, code and client-facing message. Internal details are logged
    /// and replaced by a generic message.
    pub fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Unavailable(msg) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg.clone())
                }
                CoreError::Internal(msg) => internal("Internal core error", msg),
            },

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::Inference(err) if err.is_invalid_input() => {
                (StatusCode::BAD_REQUEST, "INVALID_IMAGE", err.to_string())
            }
            AppError::Inference(err) => (
                StatusCode::BAD_GATEWAY,
                "INFERENCE_FAILED",
                format!("Model prediction failed: {err}"),
            ),
            AppError::ModelUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MODEL_UNAVAILABLE",
                self.to_string(),
            ),
            AppError::Email(err) => (
                StatusCode::BAD_GATEWAY,
                "EMAIL_DELIVERY_FAILED",
                format!("Failed to send code: {err}"),
            ),
            AppError::Provider(ProviderError::Config(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Provider(err) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                err.to_string(),
            ),
            AppError::Secret(err) => internal("Secret handling error", &err.to_string()),
            AppError::Report(err) => internal("Report rendering error", &err.to_string()),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal("Internal error", msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.classify();
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
        ) {
            tracing::warn!(error = %self, code, "Upstream failure");
        }
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

fn internal(context: &str, detail: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %detail, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// sqlx failures: missing rows are 404, `uq_*` unique violations 409,
/// foreign-key and check violations 400. Anything else is logged and
/// reported as a 500.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    let db_err = match err {
        sqlx::Error::RowNotFound => {
            return (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Resource not found".to_string(),
            )
        }
        sqlx::Error::Database(db_err) => db_err,
        other => return internal("Database error", &other.to_string()),
    };

    let constraint = db_err.constraint().unwrap_or("unknown");
    match db_err.code().as_deref() {
        Some(PG_UNIQUE_VIOLATION) if constraint.starts_with("uq_") => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Duplicate value violates unique constraint: {constraint}"),
        ),
        Some(PG_FOREIGN_KEY_VIOLATION) => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Referenced record does not exist: {constraint}"),
        ),
        Some(PG_CHECK_VIOLATION) => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            format!("Value violates constraint: {constraint}"),
        ),
        _ => internal("Database error", &db_err.to_string()),
    }
}

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
const PG_CHECK_VIOLATION: &str = "23514";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_image_is_a_client_error() {
        let err = AppError::from(InferenceError::InvalidImage("not a PNG".into()));
        assert_eq!(err.code(), "INVALID_IMAGE");
        assert_eq!(err.classify().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn model_failures_are_gateway_errors() {
        let err = AppError::from(InferenceError::BadOutput("3 scores".into()));
        assert_eq!(err.code(), "INFERENCE_FAILED");
        assert_eq!(err.classify().0, StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::ModelUnavailable.code(), "MODEL_UNAVAILABLE");
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = AppError::InternalError("disk full at /var/uploads".into());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.classify().2, "An internal error occurred");
    }

    #[test]
    fn missing_row_is_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.classify().0, StatusCode::NOT_FOUND);
    }
}
