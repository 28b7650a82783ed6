//! User entity model and DTOs.

use retina_core::otp::StoredOtp;
use retina_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// Full user row from the `users` table.
///
/// Contains the password hash and OTP digest. Never serialize this to API
/// responses directly; use [`UserResponse`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub designation: String,
    pub custom_designation: Option<String>,
    pub hospital_name: Option<String>,
    pub notes: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub otp_code_hash: Option<String>,
    pub otp_purpose: Option<String>,
    pub otp_expires_at: Option<Timestamp>,
    pub last_selected_model_id: Option<DbId>,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// The outstanding OTP, in the shape the checker expects.
    pub fn stored_otp(&self) -> StoredOtp<'_> {
        StoredOtp {
            code_hash: self.otp_code_hash.as_deref(),
            purpose: self.otp_purpose.as_deref(),
            expires_at: self.otp_expires_at,
        }
    }

    /// Designation as shown on reports: the custom text for `Other`.
    pub fn display_designation(&self) -> &str {
        self.custom_designation
            .as_deref()
            .unwrap_or(&self.designation)
    }
}

/// Safe user representation for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: DbId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub designation: String,
    pub custom_designation: Option<String>,
    pub hospital_name: Option<String>,
    pub notes: Option<String>,
    pub is_verified: bool,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            designation: u.designation.clone(),
            custom_designation: u.custom_designation.clone(),
            hospital_name: u.hospital_name.clone(),
            notes: u.notes.clone(),
            is_verified: u.is_verified,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

/// DTO for registering a pending (unverified) user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub designation: String,
    pub custom_designation: Option<String>,
    pub hospital_name: Option<String>,
}

/// DTO for profile updates. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub hospital_name: Option<String>,
    pub notes: Option<String>,
}
