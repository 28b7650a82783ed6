//! Integration tests for the repository layer against a real database:
//! - Signup OTP consumption and password reset
//! - Patient medical-ID uniqueness per user
//! - Diagnosis ownership, immutability and cascade delete
//! - AI model settings selection fallback
//! - Refresh-session redemption

use chrono::Utc;
use retina_core::otp::{self, OtpPurpose};
use retina_db::models::ai_model::CreateAiModelSetting;
use retina_db::models::diagnosis::{ClassScores, CreateDiagnosis};
use retina_db::models::patient::{CreatePatient, UpdatePatient};
use retina_db::models::session::NewSession;
use retina_db::models::user::{CreateUser, User};
use retina_db::repositories::{AiModelRepo, DiagnosisRepo, PatientRepo, SessionRepo, UserRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_user(email: &str) -> CreateUser {
    CreateUser {
        email: email.to_string(),
        password_hash: "hash".to_string(),
        first_name: "Asha".to_string(),
        last_name: "Rao".to_string(),
        designation: "Ophthalmologist".to_string(),
        custom_designation: None,
        hospital_name: Some("City Eye Clinic".to_string()),
    }
}

async fn seed_user(pool: &PgPool, email: &str) -> User {
    let issued = otp::issue(OtpPurpose::Signup, Utc::now());
    UserRepo::create_pending(pool, &new_user(email), &issued)
        .await
        .unwrap()
}

fn new_patient(medical_id: &str) -> CreatePatient {
    CreatePatient {
        first_name: "Ravi".to_string(),
        last_name: "Kumar".to_string(),
        age: Some(54),
        gender: Some("Male".to_string()),
        email: None,
        phone: Some("555-0101".to_string()),
        medical_id: medical_id.to_string(),
        notes: None,
    }
}

fn new_diagnosis(patient_id: i64, user_id: i64, sha: &str, class_name: &str) -> CreateDiagnosis {
    let mut scores = ClassScores::new();
    scores.insert(class_name.to_string(), 0.9);
    CreateDiagnosis {
        patient_id,
        user_id,
        batch_session_id: None,
        image_path: format!("uploads/{sha}.png"),
        image_filename: "fundus.png".to_string(),
        image_sha256: sha.to_string(),
        class_id: 2,
        class_name: class_name.to_string(),
        confidence: 0.9,
        confidence_percent: 90.0,
        all_predictions: scores,
        notes: None,
    }
}

// ---------------------------------------------------------------------------
// Users and OTP codes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_signup_code_is_single_use(pool: PgPool) {
    let issued = otp::issue(OtpPurpose::Signup, Utc::now());
    let user = UserRepo::create_pending(&pool, &new_user("a@example.com"), &issued)
        .await
        .unwrap();
    assert!(!user.is_verified);

    let verified = UserRepo::verify_signup(&pool, user.id, &issued.code_hash)
        .await
        .unwrap()
        .expect("code should be accepted");
    assert!(verified.is_verified);
    assert!(verified.otp_code_hash.is_none());

    let again = UserRepo::verify_signup(&pool, user.id, &issued.code_hash)
        .await
        .unwrap();
    assert!(again.is_none(), "a consumed code must not verify twice");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_wrong_code_leaves_user_unverified(pool: PgPool) {
    let user = seed_user(&pool, "b@example.com").await;
    let result = UserRepo::verify_signup(&pool, user.id, &otp::hash_code("000000"))
        .await
        .unwrap();
    assert!(result.is_none());

    let reloaded = UserRepo::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert!(!reloaded.is_verified);
    assert!(reloaded.otp_code_hash.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_signup_code_cannot_reset_password(pool: PgPool) {
    let issued = otp::issue(OtpPurpose::Signup, Utc::now());
    let user = UserRepo::create_pending(&pool, &new_user("c@example.com"), &issued)
        .await
        .unwrap();

    let reset = UserRepo::reset_password(&pool, user.id, &issued.code_hash, "new-hash")
        .await
        .unwrap();
    assert!(!reset, "purpose must match");

    let reset_code = otp::issue(OtpPurpose::PasswordReset, Utc::now());
    UserRepo::set_otp(&pool, user.id, &reset_code).await.unwrap();
    let reset = UserRepo::reset_password(&pool, user.id, &reset_code.code_hash, "new-hash")
        .await
        .unwrap();
    assert!(reset);

    let reloaded = UserRepo::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(reloaded.password_hash, "new-hash");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_expired_code_rejected(pool: PgPool) {
    let issued = otp::issue(OtpPurpose::Signup, Utc::now() - chrono::Duration::hours(1));
    let user = UserRepo::create_pending(&pool, &new_user("d@example.com"), &issued)
        .await
        .unwrap();
    let result = UserRepo::verify_signup(&pool, user.id, &issued.code_hash)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_email_rejected(pool: PgPool) {
    seed_user(&pool, "dup@example.com").await;
    let issued = otp::issue(OtpPurpose::Signup, Utc::now());
    let result = UserRepo::create_pending(&pool, &new_user("dup@example.com"), &issued).await;
    assert!(result.is_err(), "Duplicate email should fail");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_pending_ignores_verified_users(pool: PgPool) {
    let issued = otp::issue(OtpPurpose::Signup, Utc::now());
    let user = UserRepo::create_pending(&pool, &new_user("e@example.com"), &issued)
        .await
        .unwrap();
    UserRepo::verify_signup(&pool, user.id, &issued.code_hash)
        .await
        .unwrap();

    let fresh = otp::issue(OtpPurpose::Signup, Utc::now());
    let refreshed = UserRepo::refresh_pending(&pool, user.id, &new_user("e@example.com"), &fresh)
        .await
        .unwrap();
    assert!(refreshed.is_none());
}

// ---------------------------------------------------------------------------
// Patients
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_medical_id_unique_per_user(pool: PgPool) {
    let alice = seed_user(&pool, "alice@example.com").await;
    let bob = seed_user(&pool, "bob@example.com").await;

    PatientRepo::create(&pool, alice.id, &new_patient("MRN-1"))
        .await
        .unwrap();
    let dup = PatientRepo::create(&pool, alice.id, &new_patient(" MRN-1 ")).await;
    assert!(dup.is_err(), "trimmed medical ID collides");

    // Another user may reuse the same medical ID.
    PatientRepo::create(&pool, bob.id, &new_patient("MRN-1"))
        .await
        .unwrap();

    assert!(PatientRepo::medical_id_exists(&pool, alice.id, "MRN-1", None)
        .await
        .unwrap());
    assert!(!PatientRepo::medical_id_exists(&pool, alice.id, "MRN-2", None)
        .await
        .unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_medical_id_exists_excludes_self(pool: PgPool) {
    let user = seed_user(&pool, "f@example.com").await;
    let patient = PatientRepo::create(&pool, user.id, &new_patient("MRN-9"))
        .await
        .unwrap();
    assert!(
        !PatientRepo::medical_id_exists(&pool, user.id, "MRN-9", Some(patient.id))
            .await
            .unwrap()
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_patient_update_applies_only_given_fields(pool: PgPool) {
    let user = seed_user(&pool, "g@example.com").await;
    let patient = PatientRepo::create(&pool, user.id, &new_patient("MRN-3"))
        .await
        .unwrap();

    let update = UpdatePatient {
        age: Some(Some(60)),
        ..Default::default()
    };
    let updated = PatientRepo::update(&pool, patient.id, &update)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.age, Some(60));
    assert_eq!(updated.first_name, "Ravi");
    assert_eq!(updated.medical_id, "MRN-3");
    assert_eq!(updated.phone.as_deref(), Some("555-0101"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_patient_update_clears_optional_fields(pool: PgPool) {
    let user = seed_user(&pool, "g2@example.com").await;
    let patient = PatientRepo::create(&pool, user.id, &new_patient("MRN-3"))
        .await
        .unwrap();

    let update = UpdatePatient {
        age: Some(None),
        gender: Some(None),
        phone: Some(None),
        notes: Some(Some("Follow up in 6 months".to_string())),
        ..Default::default()
    };
    let updated = PatientRepo::update(&pool, patient.id, &update)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.age, None);
    assert_eq!(updated.gender, None);
    assert_eq!(updated.phone, None);
    assert_eq!(updated.notes.as_deref(), Some("Follow up in 6 months"));
    assert_eq!(updated.last_name, "Kumar");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_search_matches_full_name_and_escapes_wildcards(pool: PgPool) {
    let user = seed_user(&pool, "h@example.com").await;
    PatientRepo::create(&pool, user.id, &new_patient("MRN-4"))
        .await
        .unwrap();

    let hits = PatientRepo::search(&pool, user.id, "ravi kum", None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let none = PatientRepo::search(&pool, user.id, "%", None).await.unwrap();
    assert!(none.is_empty(), "% must match literally");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_with_latest_reports_newest_class(pool: PgPool) {
    let user = seed_user(&pool, "i@example.com").await;
    let patient = PatientRepo::create(&pool, user.id, &new_patient("MRN-5"))
        .await
        .unwrap();
    PatientRepo::create(&pool, user.id, &new_patient("MRN-6"))
        .await
        .unwrap();

    DiagnosisRepo::create(&pool, &new_diagnosis(patient.id, user.id, "aa", "Mild"))
        .await
        .unwrap();
    DiagnosisRepo::create(&pool, &new_diagnosis(patient.id, user.id, "bb", "Severe"))
        .await
        .unwrap();

    let rows = PatientRepo::list_with_latest(&pool, user.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    let row = rows.iter().find(|r| r.patient.id == patient.id).unwrap();
    assert_eq!(row.latest_class_name.as_deref(), Some("Severe"));
    let other = rows.iter().find(|r| r.patient.id != patient.id).unwrap();
    assert!(other.latest_class_name.is_none());
}

// ---------------------------------------------------------------------------
// Diagnoses
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_diagnosis_requires_patient_of_same_user(pool: PgPool) {
    let alice = seed_user(&pool, "j@example.com").await;
    let bob = seed_user(&pool, "k@example.com").await;
    let patient = PatientRepo::create(&pool, alice.id, &new_patient("MRN-7"))
        .await
        .unwrap();

    let result = DiagnosisRepo::create(&pool, &new_diagnosis(patient.id, bob.id, "cc", "Mild")).await;
    assert!(result.is_err(), "foreign patient must be rejected");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_diagnoses_are_immutable(pool: PgPool) {
    let user = seed_user(&pool, "l@example.com").await;
    let patient = PatientRepo::create(&pool, user.id, &new_patient("MRN-8"))
        .await
        .unwrap();
    let diagnosis = DiagnosisRepo::create(&pool, &new_diagnosis(patient.id, user.id, "dd", "Mild"))
        .await
        .unwrap();

    let result = sqlx::query("UPDATE diagnoses SET class_name = 'Severe' WHERE id = $1")
        .bind(diagnosis.id)
        .execute(&pool)
        .await;
    assert!(result.is_err());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_deleting_patient_removes_diagnoses(pool: PgPool) {
    let user = seed_user(&pool, "m@example.com").await;
    let patient = PatientRepo::create(&pool, user.id, &new_patient("MRN-10"))
        .await
        .unwrap();
    let diagnosis = DiagnosisRepo::create(&pool, &new_diagnosis(patient.id, user.id, "ee", "Mild"))
        .await
        .unwrap();

    assert!(PatientRepo::delete(&pool, patient.id).await.unwrap());
    assert!(DiagnosisRepo::find_by_id(&pool, diagnosis.id)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_find_duplicate_matches_image_and_class(pool: PgPool) {
    let user = seed_user(&pool, "n@example.com").await;
    let patient = PatientRepo::create(&pool, user.id, &new_patient("MRN-11"))
        .await
        .unwrap();
    let first = DiagnosisRepo::create(&pool, &new_diagnosis(patient.id, user.id, "ff", "Moderate"))
        .await
        .unwrap();

    let dup = DiagnosisRepo::find_duplicate(&pool, patient.id, user.id, "ff", "Moderate")
        .await
        .unwrap();
    assert_eq!(dup.map(|d| d.id), Some(first.id));

    let other_class = DiagnosisRepo::find_duplicate(&pool, patient.id, user.id, "ff", "Mild")
        .await
        .unwrap();
    assert!(other_class.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_by_ids_ignores_other_patients(pool: PgPool) {
    let user = seed_user(&pool, "o@example.com").await;
    let p1 = PatientRepo::create(&pool, user.id, &new_patient("MRN-12"))
        .await
        .unwrap();
    let p2 = PatientRepo::create(&pool, user.id, &new_patient("MRN-13"))
        .await
        .unwrap();
    let d1 = DiagnosisRepo::create(&pool, &new_diagnosis(p1.id, user.id, "g1", "Mild"))
        .await
        .unwrap();
    let d2 = DiagnosisRepo::create(&pool, &new_diagnosis(p2.id, user.id, "g2", "Mild"))
        .await
        .unwrap();

    let rows = DiagnosisRepo::list_by_ids_for_patient(&pool, p1.id, &[d1.id, d2.id])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, d1.id);
    assert_eq!(rows[0].all_predictions.0.get("Mild"), Some(&0.9));
}

// ---------------------------------------------------------------------------
// AI model settings
// ---------------------------------------------------------------------------

fn new_model(user_id: i64, model_name: &str, enabled: bool) -> CreateAiModelSetting {
    CreateAiModelSetting {
        user_id,
        provider_name: "openai".to_string(),
        base_url: None,
        model_name: model_name.to_string(),
        api_key_encrypted: "sealed".to_string(),
        temperature: 0.7,
        max_tokens: 1000,
        enabled,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_first_enabled_skips_disabled(pool: PgPool) {
    let user = seed_user(&pool, "p@example.com").await;
    AiModelRepo::create(&pool, &new_model(user.id, "off", false))
        .await
        .unwrap();
    let on = AiModelRepo::create(&pool, &new_model(user.id, "on", true))
        .await
        .unwrap();

    let first = AiModelRepo::first_enabled(&pool, user.id).await.unwrap();
    assert_eq!(first.map(|m| m.id), Some(on.id));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_deleting_selected_model_clears_selection(pool: PgPool) {
    let user = seed_user(&pool, "q@example.com").await;
    let model = AiModelRepo::create(&pool, &new_model(user.id, "gpt", true))
        .await
        .unwrap();
    UserRepo::set_last_selected_model(&pool, user.id, Some(model.id))
        .await
        .unwrap();

    assert!(AiModelRepo::delete(&pool, user.id, model.id).await.unwrap());
    let reloaded = UserRepo::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert!(reloaded.last_selected_model_id.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settings_invisible_to_other_users(pool: PgPool) {
    let alice = seed_user(&pool, "r@example.com").await;
    let bob = seed_user(&pool, "s@example.com").await;
    let model = AiModelRepo::create(&pool, &new_model(alice.id, "gpt", true))
        .await
        .unwrap();

    assert!(AiModelRepo::find_for_user(&pool, bob.id, model.id)
        .await
        .unwrap()
        .is_none());
    assert!(!AiModelRepo::delete(&pool, bob.id, model.id).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_out_of_range_temperature_rejected(pool: PgPool) {
    let user = seed_user(&pool, "t@example.com").await;
    let mut input = new_model(user.id, "hot", true);
    input.temperature = 2.5;
    assert!(AiModelRepo::create(&pool, &input).await.is_err());
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

fn new_session(user_id: i64, hash: &str, ttl: chrono::Duration) -> NewSession {
    NewSession {
        user_id,
        refresh_token_hash: hash.to_string(),
        expires_at: Utc::now() + ttl,
        user_agent: Some("curl/8.5".to_string()),
        ip_address: Some("10.0.0.7".to_string()),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_refresh_token_redeems_once(pool: PgPool) {
    let user = seed_user(&pool, "s1@clinic.org").await;
    let opened = SessionRepo::open(&pool, &new_session(user.id, "h1", chrono::Duration::days(7)))
        .await
        .unwrap();
    assert!(!opened.is_revoked);

    let redeemed = SessionRepo::redeem(&pool, "h1").await.unwrap().unwrap();
    assert_eq!(redeemed.id, opened.id);
    assert!(redeemed.is_revoked);
    assert!(SessionRepo::redeem(&pool, "h1").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_expired_and_revoked_sessions_are_purged(pool: PgPool) {
    let user = seed_user(&pool, "s2@clinic.org").await;
    SessionRepo::open(&pool, &new_session(user.id, "old", chrono::Duration::minutes(-1)))
        .await
        .unwrap();
    SessionRepo::open(&pool, &new_session(user.id, "a", chrono::Duration::days(7)))
        .await
        .unwrap();
    SessionRepo::open(&pool, &new_session(user.id, "b", chrono::Duration::days(7)))
        .await
        .unwrap();

    assert!(SessionRepo::redeem(&pool, "old").await.unwrap().is_none());
    assert_eq!(SessionRepo::revoke_all(&pool, user.id).await.unwrap(), 3);
    assert_eq!(SessionRepo::purge_stale(&pool).await.unwrap(), 3);
}
