//! Repository for the `ai_model_settings` table.

use retina_core::types::DbId;
use sqlx::PgPool;

use crate::models::ai_model::{AiModelSetting, CreateAiModelSetting, UpdateAiModelSetting};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, provider_name, base_url, model_name, api_key_encrypted, \
                        temperature, max_tokens, enabled, created_at, updated_at";

/// Provides CRUD operations for per-user AI model settings.
pub struct AiModelRepo;

impl AiModelRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateAiModelSetting,
    ) -> Result<AiModelSetting, sqlx::Error> {
        let query = format!(
            "INSERT INTO ai_model_settings (user_id, provider_name, base_url, model_name,
                                            api_key_encrypted, temperature, max_tokens, enabled)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AiModelSetting>(&query)
            .bind(input.user_id)
            .bind(&input.provider_name)
            .bind(&input.base_url)
            .bind(&input.model_name)
            .bind(&input.api_key_encrypted)
            .bind(input.temperature)
            .bind(input.max_tokens)
            .bind(input.enabled)
            .fetch_one(pool)
            .await
    }

    /// Find one of `user_id`'s settings. Other users' rows are invisible.
    pub async fn find_for_user(
        pool: &PgPool,
        user_id: DbId,
        id: DbId,
    ) -> Result<Option<AiModelSetting>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM ai_model_settings WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, AiModelSetting>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// All of `user_id`'s settings, oldest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<AiModelSetting>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ai_model_settings
             WHERE user_id = $1
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, AiModelSetting>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Update a setting. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if `user_id` owns no setting with the given `id`.
    pub async fn update(
        pool: &PgPool,
        user_id: DbId,
        id: DbId,
        input: &UpdateAiModelSetting,
    ) -> Result<Option<AiModelSetting>, sqlx::Error> {
        let query = format!(
            "UPDATE ai_model_settings SET
                provider_name = COALESCE($3, provider_name),
                base_url = $4,
                model_name = COALESCE($5, model_name),
                api_key_encrypted = COALESCE($6, api_key_encrypted),
                temperature = COALESCE($7, temperature),
                max_tokens = COALESCE($8, max_tokens),
                enabled = COALESCE($9, enabled)
             WHERE id = $1 AND user_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AiModelSetting>(&query)
            .bind(id)
            .bind(user_id)
            .bind(&input.provider_name)
            .bind(&input.base_url)
            .bind(&input.model_name)
            .bind(&input.api_key_encrypted)
            .bind(input.temperature)
            .bind(input.max_tokens)
            .bind(input.enabled)
            .fetch_optional(pool)
            .await
    }

    /// Delete a setting. A user pointing at it loses the selection.
    pub async fn delete(pool: &PgPool, user_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ai_model_settings WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The oldest enabled setting, used when nothing usable is selected.
    pub async fn first_enabled(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<AiModelSetting>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ai_model_settings
             WHERE user_id = $1 AND enabled = true
             ORDER BY created_at, id
             LIMIT 1"
        );
        sqlx::query_as::<_, AiModelSetting>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }
}
