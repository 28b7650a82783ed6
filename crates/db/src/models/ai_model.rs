//! AI-model (suggestion provider) settings model and DTOs.

use retina_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `ai_model_settings` table.
///
/// `api_key_encrypted` is sealed with the server secret; API responses
/// carry only a masked form.
#[derive(Debug, Clone, FromRow)]
pub struct AiModelSetting {
    pub id: DbId,
    pub user_id: DbId,
    pub provider_name: String,
    pub base_url: Option<String>,
    pub model_name: String,
    pub api_key_encrypted: String,
    pub temperature: f64,
    pub max_tokens: i32,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a setting. The key is already sealed.
#[derive(Debug, Clone)]
pub struct CreateAiModelSetting {
    pub user_id: DbId,
    pub provider_name: String,
    pub base_url: Option<String>,
    pub model_name: String,
    pub api_key_encrypted: String,
    pub temperature: f64,
    pub max_tokens: i32,
    pub enabled: bool,
}

/// DTO for updating a setting. `None` leaves a column unchanged, except
/// `base_url`, which is always written so it can be cleared.
#[derive(Debug, Clone, Default)]
pub struct UpdateAiModelSetting {
    pub provider_name: Option<String>,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub api_key_encrypted: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
    pub enabled: Option<bool>,
}
