//! Repository for the `users` table.

use retina_core::otp::{IssuedOtp, OtpPurpose};
use retina_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::{CreateUser, UpdateProfile, User};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, email, password_hash, first_name, last_name, designation, \
                        custom_designation, hospital_name, notes, is_verified, is_active, \
                        otp_code_hash, otp_purpose, otp_expires_at, last_selected_model_id, \
                        last_login_at, created_at, updated_at";

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Insert an unverified user with an outstanding signup code.
    pub async fn create_pending(
        pool: &PgPool,
        input: &CreateUser,
        otp: &IssuedOtp,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, password_hash, first_name, last_name, designation,
                                custom_designation, hospital_name,
                                otp_code_hash, otp_purpose, otp_expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(&input.designation)
            .bind(&input.custom_designation)
            .bind(&input.hospital_name)
            .bind(&otp.code_hash)
            .bind(otp.purpose.as_str())
            .bind(otp.expires_at)
            .fetch_one(pool)
            .await
    }

    /// Overwrite the registration details of a still-unverified user and
    /// issue a fresh signup code. Returns `None` once the user is verified.
    pub async fn refresh_pending(
        pool: &PgPool,
        id: DbId,
        input: &CreateUser,
        otp: &IssuedOtp,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET
                password_hash = $2,
                first_name = $3,
                last_name = $4,
                designation = $5,
                custom_designation = $6,
                hospital_name = $7,
                otp_code_hash = $8,
                otp_purpose = $9,
                otp_expires_at = $10
             WHERE id = $1 AND is_verified = false
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(&input.password_hash)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(&input.designation)
            .bind(&input.custom_designation)
            .bind(&input.hospital_name)
            .bind(&otp.code_hash)
            .bind(otp.purpose.as_str())
            .bind(otp.expires_at)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// `Some(is_active)` for an existing user, `None` otherwise. Checked on
    /// every authenticated request.
    pub async fn active_flag(pool: &PgPool, id: DbId) -> Result<Option<bool>, sqlx::Error> {
        sqlx::query_scalar("SELECT is_active FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by email. Emails are stored lower-cased.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Replace the outstanding code with a new one.
    pub async fn set_otp(pool: &PgPool, id: DbId, otp: &IssuedOtp) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET otp_code_hash = $2, otp_purpose = $3, otp_expires_at = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(&otp.code_hash)
        .bind(otp.purpose.as_str())
        .bind(otp.expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Consume a signup code and mark the user verified in one statement.
    ///
    /// Returns `None` when the code does not match, has expired or was
    /// already used, so a code can never be redeemed twice.
    pub async fn verify_signup(
        pool: &PgPool,
        id: DbId,
        code_hash: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET
                is_verified = true,
                otp_code_hash = NULL,
                otp_purpose = NULL,
                otp_expires_at = NULL
             WHERE id = $1
               AND otp_code_hash = $2
               AND otp_purpose = $3
               AND otp_expires_at > NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(code_hash)
            .bind(OtpPurpose::Signup.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Consume a password-reset code and store the new hash. Returns `true`
    /// if the code was accepted.
    pub async fn reset_password(
        pool: &PgPool,
        id: DbId,
        code_hash: &str,
        new_password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET
                password_hash = $4,
                otp_code_hash = NULL,
                otp_purpose = NULL,
                otp_expires_at = NULL
             WHERE id = $1
               AND otp_code_hash = $2
               AND otp_purpose = $3
               AND otp_expires_at > NOW()",
        )
        .bind(id)
        .bind(code_hash)
        .bind(OtpPurpose::PasswordReset.as_str())
        .bind(new_password_hash)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set `last_login_at` to now.
    pub async fn record_successful_login(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Update profile fields. Only non-`None` fields in `input` are applied.
    pub async fn update_profile(
        pool: &PgPool,
        id: DbId,
        input: &UpdateProfile,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                hospital_name = COALESCE($4, hospital_name),
                notes = COALESCE($5, notes)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(&input.hospital_name)
            .bind(&input.notes)
            .fetch_optional(pool)
            .await
    }

    pub async fn update_password(
        pool: &PgPool,
        id: DbId,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Soft-deactivate a user by setting `is_active = false`.
    ///
    /// Returns `true` if the row was updated.
    pub async fn deactivate(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET is_active = false WHERE id = $1 AND is_active = true")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remember which AI model the user picked last (`None` clears it).
    pub async fn set_last_selected_model(
        pool: &PgPool,
        id: DbId,
        model_id: Option<DbId>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_selected_model_id = $2 WHERE id = $1")
            .bind(id)
            .bind(model_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
