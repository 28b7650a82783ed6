//! Handlers for the signed-in user's own account.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use retina_core::error::CoreError;
use retina_core::validation;
use retina_db::models::user::{UpdateProfile, User, UserResponse};
use retina_db::repositories::{SessionRepo, UserRepo};
use retina_db::DbPool;
use serde::Deserialize;

use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::{DataResponse, MessageResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub hospital_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateRequest {
    pub password: String,
}

/// GET /api/v1/account
pub async fn get_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    let user = load_user(&state.pool, &auth_user).await?;
    Ok(Json(DataResponse {
        data: UserResponse::from(&user),
    }))
}

/// PUT /api/v1/account
pub async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<UpdateProfileRequest>,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    if let Some(first_name) = input.first_name.as_deref() {
        validation::validate_first_name(first_name)?;
    }
    let trim = |v: Option<String>| v.map(|s| s.trim().to_string());
    let changes = UpdateProfile {
        first_name: trim(input.first_name),
        last_name: trim(input.last_name),
        hospital_name: trim(input.hospital_name),
        notes: input.notes,
    };

    let user = UserRepo::update_profile(&state.pool, auth_user.user_id, &changes)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "User",
            id: auth_user.user_id,
        }))?;
    Ok(Json(DataResponse {
        data: UserResponse::from(&user),
    }))
}

/// POST /api/v1/account/password
///
/// Every session is revoked; the client must sign in again.
pub async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let user = load_user(&state.pool, &auth_user).await?;
    if !verify_password(&input.current_password, &user.password_hash)? {
        return Err(AppError::Core(CoreError::Validation(
            "Current password is incorrect".into(),
        )));
    }
    validation::validate_new_password(&input.new_password, &input.confirm_password)?;

    let password_hash = hash_password(&input.new_password)?;
    UserRepo::update_password(&state.pool, user.id, &password_hash).await?;
    SessionRepo::revoke_all(&state.pool, user.id).await?;
    tracing::info!(user_id = user.id, "Password changed");

    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// DELETE /api/v1/account
///
/// Deactivate the account. Data is kept; sign-in is refused afterwards.
pub async fn deactivate(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<DeactivateRequest>,
) -> AppResult<StatusCode> {
    let user = load_user(&state.pool, &auth_user).await?;
    if !verify_password(&input.password, &user.password_hash)? {
        return Err(AppError::Core(CoreError::Validation(
            "Password is incorrect".into(),
        )));
    }

    UserRepo::deactivate(&state.pool, user.id).await?;
    SessionRepo::revoke_all(&state.pool, user.id).await?;
    tracing::info!(user_id = user.id, "Account deactivated");

    Ok(StatusCode::NO_CONTENT)
}

async fn load_user(pool: &DbPool, auth_user: &AuthUser) -> AppResult<User> {
    UserRepo::find_by_id(pool, auth_user.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "User",
            id: auth_user.user_id,
        }))
}
