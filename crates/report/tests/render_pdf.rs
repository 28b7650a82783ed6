//! Rendering tests: every report kind produces a PDF and the JSON form
//! mirrors the stored rows.

use chrono::{TimeZone, Utc};
use retina_db::models::diagnosis::{ClassScores, Diagnosis};
use retina_db::models::patient::Patient;
use retina_db::models::user::User;
use retina_report::{render_pdf, ReportDocument};
use sqlx::types::Json;
use uuid::Uuid;

fn patient() -> Patient {
    let t = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
    Patient {
        id: 3,
        user_id: 1,
        first_name: "Meera".into(),
        last_name: "Iyer".into(),
        age: Some(61),
        gender: Some("Female".into()),
        email: None,
        phone: Some("555-0199".into()),
        medical_id: "MRN-3".into(),
        notes: None,
        created_at: t,
        updated_at: t,
    }
}

fn physician() -> User {
    let t = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
    User {
        id: 1,
        email: "dr@example.com".into(),
        password_hash: String::new(),
        first_name: "Asha".into(),
        last_name: "Rao".into(),
        designation: "Ophthalmologist".into(),
        custom_designation: None,
        hospital_name: Some("City Eye Clinic".into()),
        notes: None,
        is_verified: true,
        is_active: true,
        otp_code_hash: None,
        otp_purpose: None,
        otp_expires_at: None,
        last_selected_model_id: None,
        last_login_at: None,
        created_at: t,
        updated_at: t,
    }
}

fn diagnoses(n: usize) -> Vec<Diagnosis> {
    let classes = ["No DR", "Mild", "Moderate", "Severe", "Proliferative"];
    (0..n)
        .map(|i| Diagnosis {
            id: i as i64 + 1,
            patient_id: 3,
            user_id: 1,
            batch_session_id: None,
            image_path: format!("uploads/{i}.png"),
            image_filename: format!("eye_{i}.png"),
            image_sha256: format!("{i:064}"),
            class_id: (i % 5) as i16,
            class_name: classes[i % 5].into(),
            confidence: 0.8,
            confidence_percent: 80.0,
            all_predictions: Json(ClassScores::new()),
            notes: Some(format!("observation {}", i % 3)),
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 10, (i % 60) as u32, 0).unwrap(),
        })
        .collect()
}

#[test]
fn diagnostic_report_renders() {
    let doc = ReportDocument::diagnostic(&patient(), &physician(), &diagnoses(3), Utc::now());
    let pdf = render_pdf(&doc).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[test]
fn history_report_renders() {
    let doc = ReportDocument::history(&patient(), &physician(), &diagnoses(4), Utc::now());
    let pdf = render_pdf(&doc).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[test]
fn batch_session_report_renders() {
    let doc = ReportDocument::batch_session(
        &patient(),
        &physician(),
        Uuid::new_v4(),
        &diagnoses(2),
        Utc::now(),
    );
    let pdf = render_pdf(&doc).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[test]
fn long_report_is_larger_than_short_one() {
    let short = render_pdf(&ReportDocument::diagnostic(
        &patient(),
        &physician(),
        &diagnoses(1),
        Utc::now(),
    ))
    .unwrap();
    let long = render_pdf(&ReportDocument::diagnostic(
        &patient(),
        &physician(),
        &diagnoses(120),
        Utc::now(),
    ))
    .unwrap();
    assert!(long.len() > short.len());
}

#[test]
fn json_document_matches_rows() {
    let rows = diagnoses(2);
    let doc = ReportDocument::diagnostic(&patient(), &physician(), &rows, Utc::now());
    let value = serde_json::to_value(&doc).unwrap();
    assert_eq!(value["kind"], "diagnostic");
    assert_eq!(value["patient"]["medical_id"], "MRN-3");
    assert_eq!(value["patient"]["age"], 61);
    assert_eq!(value["findings"][1]["class_name"], rows[1].class_name);
    assert_eq!(value["findings"][1]["diagnosis_id"], rows[1].id);
    assert!(value.get("history").is_none());
}
