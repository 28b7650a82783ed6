//! Handlers for the `/auth` resource (signup with OTP, login, refresh,
//! logout, password reset).

use axum::extract::State;
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use retina_core::error::CoreError;
use retina_core::otp::{self, OtpCheck, OtpPurpose};
use retina_core::types::Timestamp;
use retina_core::validation;
use retina_db::models::session::NewSession;
use retina_db::models::user::{CreateUser, User, UserResponse};
use retina_db::repositories::{SessionRepo, UserRepo};
use retina_events::OtpMessage;
use serde::{Deserialize, Serialize};

use crate::auth::jwt::{issue_access_token, refresh_token_hash, RefreshToken};
use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::MessageResponse;
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const RESET_REQUESTED: &str = "If the account exists, a reset code has been sent";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/signup`.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub designation: String,
    pub custom_designation: Option<String>,
    pub hospital_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Request body for `POST /auth/signup/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub otp: String,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for `POST /auth/password-reset/confirm`.
#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Returned when a code has been emailed.
#[derive(Debug, Serialize)]
pub struct OtpSentResponse {
    pub message: String,
    pub email: String,
    pub expires_at: Timestamp,
}

/// Successful authentication response returned by verify, login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

// ---------------------------------------------------------------------------
// Signup
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/signup
///
/// Register a pending account and email a signup code. Re-submitting for an
/// email that is still unverified replaces the details and the code.
pub async fn signup(
    State(state): State<AppState>,
    Json(input): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<OtpSentResponse>)> {
    let email = validation::normalize_email(&input.email)?;
    validation::validate_new_password(&input.password, &input.confirm_password)?;
    let custom_designation = validation::validate_designation(
        &input.designation,
        input.custom_designation.as_deref(),
    )?;

    let existing = UserRepo::find_by_email(&state.pool, &email).await?;
    if existing.as_ref().is_some_and(|u| u.is_verified) {
        return Err(AppError::Core(CoreError::Conflict(
            "Email already exists".into(),
        )));
    }

    let password_hash = hash_password(&input.password)?;
    let new_user = CreateUser {
        email,
        password_hash,
        first_name: input.first_name.trim().to_string(),
        last_name: input.last_name.trim().to_string(),
        designation: input.designation.trim().to_string(),
        custom_designation,
        hospital_name: non_empty(input.hospital_name),
    };
    let code = otp::issue(OtpPurpose::Signup, Utc::now());

    let user = match existing {
        Some(pending) => UserRepo::refresh_pending(&state.pool, pending.id, &new_user, &code)
            .await?
            .ok_or_else(|| {
                AppError::Core(CoreError::Conflict("Email already exists".into()))
            })?,
        None => UserRepo::create_pending(&state.pool, &new_user, &code).await?,
    };

    send_code(&state, &user, &code.code, OtpPurpose::Signup).await?;
    tracing::info!(user_id = user.id, "Signup code issued");

    Ok((
        StatusCode::CREATED,
        Json(OtpSentResponse {
            message: "OTP sent to your email".into(),
            email: user.email,
            expires_at: code.expires_at,
        }),
    ))
}

/// POST /api/v1/auth/signup/resend
///
/// Issue a fresh signup code for a pending account.
pub async fn resend_signup_otp(
    State(state): State<AppState>,
    Json(input): Json<EmailRequest>,
) -> AppResult<Json<OtpSentResponse>> {
    let email = validation::normalize_email(&input.email)?;
    let user = UserRepo::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Validation(
                "No pending signup for this email".into(),
            ))
        })?;
    if user.is_verified {
        return Err(AppError::Core(CoreError::Conflict(
            "Account is already verified".into(),
        )));
    }

    let code = otp::issue(OtpPurpose::Signup, Utc::now());
    UserRepo::set_otp(&state.pool, user.id, &code).await?;
    send_code(&state, &user, &code.code, OtpPurpose::Signup).await?;

    Ok(Json(OtpSentResponse {
        message: "OTP sent to your email".into(),
        email: user.email,
        expires_at: code.expires_at,
    }))
}

/// POST /api/v1/auth/signup/verify
///
/// Consume the signup code, activate the account and sign the user in.
pub async fn verify_signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<VerifyRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = validation::normalize_email(&input.email)?;
    let user = UserRepo::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| unauthorized(OtpCheck::Absent.rejection_message()))?;
    if user.is_verified {
        return Err(AppError::Core(CoreError::Conflict(
            "Account is already verified".into(),
        )));
    }

    let check = otp::check(user.stored_otp(), OtpPurpose::Signup, &input.otp, Utc::now());
    if check != OtpCheck::Valid {
        return Err(unauthorized(check.rejection_message()));
    }

    // The update re-checks the code, so a concurrent verify cannot reuse it.
    let user = UserRepo::verify_signup(&state.pool, user.id, &otp::hash_code(&input.otp))
        .await?
        .ok_or_else(|| unauthorized(OtpCheck::Absent.rejection_message()))?;
    UserRepo::record_successful_login(&state.pool, user.id).await?;
    tracing::info!(user_id = user.id, "Account verified");

    Ok(Json(create_auth_response(&state, &user, &headers).await?))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/login
///
/// Authenticate with email + password. Returns access and refresh tokens.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = input.email.trim().to_lowercase();
    let user = UserRepo::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| unauthorized(INVALID_CREDENTIALS))?;

    if !verify_password(&input.password, &user.password_hash)? {
        return Err(unauthorized(INVALID_CREDENTIALS));
    }

    ensure_can_sign_in(&user)?;

    UserRepo::record_successful_login(&state.pool, user.id).await?;
    Ok(Json(create_auth_response(&state, &user, &headers).await?))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a valid refresh token for new access + refresh tokens.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let token_hash = refresh_token_hash(&input.refresh_token);

    // Rotation: the old token is spent whether or not the rest succeeds.
    let session = SessionRepo::redeem(&state.pool, &token_hash)
        .await?
        .ok_or_else(|| unauthorized("Invalid or expired refresh token"))?;

    let user = UserRepo::find_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(|| unauthorized("User no longer exists"))?;
    ensure_can_sign_in(&user)?;

    Ok(Json(create_auth_response(&state, &user, &headers).await?))
}

/// POST /api/v1/auth/logout
///
/// Revoke all sessions for the authenticated user. Returns 204 No Content.
pub async fn logout(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<StatusCode> {
    let revoked = SessionRepo::revoke_all(&state.pool, auth_user.user_id).await?;
    tracing::debug!(user_id = auth_user.user_id, revoked, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/password-reset
///
/// Email a reset code. Always answers 200 so the endpoint does not reveal
/// which addresses are registered.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(input): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = validation::normalize_email(&input.email)?;
    let user = UserRepo::find_by_email(&state.pool, &email).await?;

    match user {
        Some(user) if user.is_verified && user.is_active => {
            let code = otp::issue(OtpPurpose::PasswordReset, Utc::now());
            UserRepo::set_otp(&state.pool, user.id, &code).await?;
            send_code(&state, &user, &code.code, OtpPurpose::PasswordReset).await?;
            tracing::info!(user_id = user.id, "Password reset code issued");
        }
        _ => tracing::debug!("Password reset requested for unknown or inactive account"),
    }

    Ok(Json(MessageResponse::new(RESET_REQUESTED)))
}

/// POST /api/v1/auth/password-reset/confirm
///
/// Consume a reset code, set the new password and revoke every session.
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(input): Json<ResetConfirmRequest>,
) -> AppResult<Json<MessageResponse>> {
    validation::validate_new_password(&input.new_password, &input.confirm_password)?;
    let email = validation::normalize_email(&input.email)?;
    let user = UserRepo::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| unauthorized("Invalid or expired reset code"))?;

    let check = otp::check(
        user.stored_otp(),
        OtpPurpose::PasswordReset,
        &input.code,
        Utc::now(),
    );
    if check != OtpCheck::Valid {
        return Err(unauthorized(check.rejection_message()));
    }

    let password_hash = hash_password(&input.new_password)?;
    let accepted = UserRepo::reset_password(
        &state.pool,
        user.id,
        &otp::hash_code(&input.code),
        &password_hash,
    )
    .await?;
    if !accepted {
        return Err(unauthorized("Invalid or expired reset code"));
    }

    SessionRepo::revoke_all(&state.pool, user.id).await?;
    tracing::info!(user_id = user.id, "Password reset");

    Ok(Json(MessageResponse::new("Password reset successfully")))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unauthorized(message: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(message.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn ensure_can_sign_in(user: &User) -> AppResult<()> {
    if !user.is_active {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }
    if !user.is_verified {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is not verified. Enter the code sent to your email.".into(),
        )));
    }
    Ok(())
}

async fn send_code(state: &AppState, user: &User, code: &str, purpose: OtpPurpose) -> AppResult<()> {
    let message = OtpMessage {
        to: user.email.clone(),
        recipient_name: Some(user.first_name.clone()).filter(|n| !n.is_empty()),
        code: code.to_string(),
        purpose,
    };
    state.mailer.send_code(&message).await?;
    Ok(())
}

/// Open a session for `user`: a new refresh-token row plus an access token.
async fn create_auth_response(
    state: &AppState,
    user: &User,
    headers: &HeaderMap,
) -> AppResult<AuthResponse> {
    let jwt = &state.config.jwt;
    let access_token = issue_access_token(user.id, &user.email, jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;
    let refresh = RefreshToken::generate();

    SessionRepo::open(
        &state.pool,
        &NewSession {
            user_id: user.id,
            refresh_token_hash: refresh.hash,
            expires_at: Utc::now() + chrono::Duration::days(jwt.refresh_token_expiry_days),
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            ip_address: headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|ip| ip.trim().to_string()),
        },
    )
    .await?;

    Ok(AuthResponse {
        access_token,
        refresh_token: refresh.plaintext,
        expires_in: jwt.access_token_ttl_secs(),
        user: UserResponse::from(user),
    })
}
