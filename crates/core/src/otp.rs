//! One-time passcodes for signup verification and password reset.
//!
//! Codes are six random digits. Only the SHA-256 digest is persisted, along
//! with the purpose it was issued for and its expiry. A code issued for one
//! purpose never satisfies the other.

use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::hashing::sha256_hex;
use crate::types::Timestamp;

/// Minutes a freshly issued code stays valid.
pub const OTP_VALIDITY_MINS: i64 = 10;

const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;

/// What an outstanding code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Signup,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            OtpPurpose::Signup => "signup",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

/// A newly generated code. `code` goes to the user, the rest to the database.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub code_hash: String,
    pub purpose: OtpPurpose,
    pub expires_at: Timestamp,
}

/// Generate a uniformly random six-digit code valid for [`OTP_VALIDITY_MINS`].
pub fn issue(purpose: OtpPurpose, now: Timestamp) -> IssuedOtp {
    let code = rand::rng().random_range(OTP_MIN..=OTP_MAX).to_string();
    IssuedOtp {
        code_hash: hash_code(&code),
        code,
        purpose,
        expires_at: now + Duration::minutes(OTP_VALIDITY_MINS),
    }
}

pub fn hash_code(code: &str) -> String {
    sha256_hex(code.trim().as_bytes())
}

/// The OTP columns of a user row.
#[derive(Debug, Clone, Copy)]
pub struct StoredOtp<'a> {
    pub code_hash: Option<&'a str>,
    pub purpose: Option<&'a str>,
    pub expires_at: Option<Timestamp>,
}

/// Outcome of comparing a submitted code with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Mismatch,
    Expired,
    /// No code outstanding for this purpose (never issued or already used).
    Absent,
}

impl OtpCheck {
    /// Message shown to the client for a failed check.
    pub fn rejection_message(self) -> &'static str {
        match self {
            OtpCheck::Valid => "Code accepted",
            OtpCheck::Mismatch => "Invalid verification code",
            OtpCheck::Expired => "Verification code has expired. Request a new one.",
            OtpCheck::Absent => "No pending verification code. Request a new one.",
        }
    }
}

/// Check `submitted` against the stored state at time `now`.
pub fn check(
    stored: StoredOtp<'_>,
    purpose: OtpPurpose,
    submitted: &str,
    now: Timestamp,
) -> OtpCheck {
    let (Some(hash), Some(stored_purpose), Some(expires_at)) =
        (stored.code_hash, stored.purpose, stored.expires_at)
    else {
        return OtpCheck::Absent;
    };

    if stored_purpose != purpose.as_str() {
        return OtpCheck::Absent;
    }
    if now > expires_at {
        return OtpCheck::Expired;
    }
    if hash_code(submitted) != hash {
        return OtpCheck::Mismatch;
    }
    OtpCheck::Valid
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn stored(otp: &IssuedOtp) -> StoredOtp<'_> {
        StoredOtp {
            code_hash: Some(&otp.code_hash),
            purpose: Some(otp.purpose.as_str()),
            expires_at: Some(otp.expires_at),
        }
    }

    #[test]
    fn issued_codes_are_six_digits() {
        let now = Utc::now();
        for _ in 0..200 {
            let otp = issue(OtpPurpose::Signup, now);
            assert_eq!(otp.code.len(), 6);
            let n: u32 = otp.code.parse().unwrap();
            assert!((OTP_MIN..=OTP_MAX).contains(&n));
            assert_eq!(otp.expires_at - now, Duration::minutes(10));
        }
    }

    #[test]
    fn correct_code_within_window_is_valid() {
        let now = Utc::now();
        let otp = issue(OtpPurpose::Signup, now);
        let later = now + Duration::minutes(9);
        assert_eq!(check(stored(&otp), OtpPurpose::Signup, &otp.code, later), OtpCheck::Valid);
    }

    #[test]
    fn expired_code_is_rejected() {
        let now = Utc::now();
        let otp = issue(OtpPurpose::Signup, now);
        let later = now + Duration::minutes(11);
        assert_eq!(
            check(stored(&otp), OtpPurpose::Signup, &otp.code, later),
            OtpCheck::Expired
        );
    }

    #[test]
    fn wrong_code_is_a_mismatch() {
        let now = Utc::now();
        let otp = issue(OtpPurpose::Signup, now);
        let wrong = if otp.code == "123456" { "654321" } else { "123456" };
        assert_eq!(check(stored(&otp), OtpPurpose::Signup, wrong, now), OtpCheck::Mismatch);
    }

    #[test]
    fn purpose_mismatch_counts_as_absent() {
        let now = Utc::now();
        let otp = issue(OtpPurpose::PasswordReset, now);
        assert_eq!(
            check(stored(&otp), OtpPurpose::Signup, &otp.code, now),
            OtpCheck::Absent
        );
    }

    #[test]
    fn cleared_code_is_absent() {
        let empty = StoredOtp {
            code_hash: None,
            purpose: None,
            expires_at: None,
        };
        assert_eq!(check(empty, OtpPurpose::Signup, "123456", Utc::now()), OtpCheck::Absent);
    }
}
