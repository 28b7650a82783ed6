use std::sync::Arc;

use retina_core::secrets::SecretBox;
use retina_events::OtpMailer;
use retina_inference::{InferenceAdapter, SuggestionClient};

use crate::config::ServerConfig;
use crate::error::AppError;

/// Handler state. Every field is an `Arc` or a pool/client handle, so clones
/// are shallow.
#[derive(Clone)]
pub struct AppState {
    pub pool: retina_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Delivers signup and password-reset codes.
    pub mailer: Arc<dyn OtpMailer>,
    /// Fundus image classifier; `None` when no model endpoint is configured.
    pub classifier: Option<InferenceAdapter>,
    /// Seals and opens stored provider API keys.
    pub secrets: SecretBox,
    /// HTTP client for prescription-suggestion providers.
    pub suggestions: SuggestionClient,
}

impl AppState {
    /// The classifier, or 503 when none is configured.
    pub fn classifier(&self) -> Result<&InferenceAdapter, AppError> {
        self.classifier.as_ref().ok_or(AppError::ModelUnavailable)
    }
}
