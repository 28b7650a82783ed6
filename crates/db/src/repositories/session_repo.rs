//! `user_sessions`: one row per issued refresh token.

use retina_core::types::DbId;
use sqlx::PgPool;

use crate::models::session::{NewSession, RefreshSession};

const COLUMNS: &str = "id, user_id, expires_at, is_revoked, user_agent, ip_address, created_at";

pub struct SessionRepo;

impl SessionRepo {
    pub async fn open(pool: &PgPool, session: &NewSession) -> Result<RefreshSession, sqlx::Error> {
        sqlx::query_as::<_, RefreshSession>(&format!(
            "INSERT INTO user_sessions
                 (user_id, refresh_token_hash, expires_at, user_agent, ip_address)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        ))
        .bind(session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(session.expires_at)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .fetch_one(pool)
        .await
    }

    /// Spend a refresh token: revoke its session if it is still live and
    /// return it. A token can be redeemed once; a concurrent second attempt
    /// gets `None`.
    pub async fn redeem(
        pool: &PgPool,
        refresh_token_hash: &str,
    ) -> Result<Option<RefreshSession>, sqlx::Error> {
        sqlx::query_as::<_, RefreshSession>(&format!(
            "UPDATE user_sessions SET is_revoked = true
             WHERE refresh_token_hash = $1
               AND NOT is_revoked
               AND expires_at > NOW()
             RETURNING {COLUMNS}"
        ))
        .bind(refresh_token_hash)
        .fetch_optional(pool)
        .await
    }

    /// Sign the user out everywhere. Returns how many live sessions ended.
    pub async fn revoke_all(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        let done = sqlx::query(
            "UPDATE user_sessions SET is_revoked = true WHERE user_id = $1 AND NOT is_revoked",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(done.rows_affected())
    }

    /// Drop sessions that can no longer be redeemed.
    pub async fn purge_stale(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let done = sqlx::query("DELETE FROM user_sessions WHERE is_revoked OR expires_at <= NOW()")
            .execute(pool)
            .await?;
        Ok(done.rows_affected())
    }
}
