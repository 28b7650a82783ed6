//! Report content assembled from stored rows.
//!
//! Every patient and diagnosis field is copied verbatim from the row it came
//! from; display fallbacks (`PID-{id}`, `N/A`) are applied only by the
//! `display_*` helpers the renderer uses.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DurationRound, TimeDelta};
use retina_core::severity::{self, SeverityClass};
use retina_core::types::{DbId, Timestamp};
use retina_db::models::diagnosis::Diagnosis;
use retina_db::models::patient::Patient;
use retina_db::models::user::User;
use serde::Serialize;
use uuid::Uuid;

pub const BRAND: &str = "RetinaAI";
pub const DISCLAIMER: &str =
    "DISCLAIMER: This report is computer-generated and is for reference only. Clinical \
     correlation is required.";
const HISTORY_FOOTER: &str = "RetinaAI | Confidential Medical Record";
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Diagnostic,
    History,
    BatchSession,
}

impl ReportKind {
    pub fn title(self) -> &'static str {
        match self {
            ReportKind::Diagnostic => "DIAGNOSTIC REPORT",
            ReportKind::History => "PATIENT HISTORY REPORT",
            ReportKind::BatchSession => "BATCH ANALYSIS REPORT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientSection {
    pub id: DbId,
    pub first_name: String,
    pub last_name: String,
    pub medical_id: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
}

impl PatientSection {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn display_medical_id(&self) -> String {
        if self.medical_id.trim().is_empty() {
            format!("PID-{}", self.id)
        } else {
            self.medical_id.clone()
        }
    }

    pub fn display_age_gender(&self) -> String {
        let age = self
            .age
            .map_or_else(|| NOT_AVAILABLE.to_string(), |a| a.to_string());
        format!("{age} / {}", or_na(self.gender.as_deref()))
    }

    pub fn display_contact(&self) -> &str {
        or_na(self.phone.as_deref())
    }
}

impl From<&Patient> for PatientSection {
    fn from(p: &Patient) -> Self {
        Self {
            id: p.id,
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            medical_id: p.medical_id.clone(),
            age: p.age,
            gender: p.gender.clone(),
            phone: p.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicianSection {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub designation: String,
    pub hospital_name: Option<String>,
}

impl PhysicianSection {
    pub fn display_name(&self) -> String {
        format!("Dr. {} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn display_hospital(&self) -> &str {
        or_na(self.hospital_name.as_deref())
    }
}

impl From<&User> for PhysicianSection {
    fn from(u: &User) -> Self {
        Self {
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            email: u.email.clone(),
            designation: u.display_designation().to_string(),
            hospital_name: u.hospital_name.clone(),
        }
    }
}

/// One row of the findings table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    /// `IMG-001`, `IMG-002`, ... in report order.
    pub image_id: String,
    pub diagnosis_id: DbId,
    pub image_filename: String,
    pub class_name: String,
    pub confidence: f64,
    pub confidence_percent: f64,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    /// Stored diagnoses only; files that failed analysis were never recorded.
    pub total_images: usize,
    pub average_confidence_percent: f64,
}

/// Findings recorded within the same minute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub recorded_at: Timestamp,
    pub label: String,
    /// Distinct class names, alphabetical.
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conclusion {
    pub class_name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDocument {
    pub kind: ReportKind,
    pub title: String,
    pub generated_at: Timestamp,
    pub patient: PatientSection,
    pub physician: PhysicianSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<AnalysisSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
    pub clinical_observations: Vec<String>,
    pub footer: String,
}

impl ReportDocument {
    /// Findings table, summary and conclusion for `diagnoses`, in the
    /// order given.
    pub fn diagnostic(
        patient: &Patient,
        physician: &User,
        diagnoses: &[Diagnosis],
        generated_at: Timestamp,
    ) -> Self {
        let physician = PhysicianSection::from(physician);
        Self {
            kind: ReportKind::Diagnostic,
            title: ReportKind::Diagnostic.title().to_string(),
            generated_at,
            patient: PatientSection::from(patient),
            batch_session_id: None,
            summary: Some(summarise(diagnoses)),
            findings: findings(diagnoses),
            history: Vec::new(),
            conclusion: conclusion(diagnoses),
            clinical_observations: clinical_observations(diagnoses),
            footer: format!(
                "{BRAND} Diagnostics | {} | {}",
                physician.display_name(),
                physician.email
            ),
            physician,
        }
    }

    /// The diagnostic layout for one batch analysis.
    pub fn batch_session(
        patient: &Patient,
        physician: &User,
        batch_session_id: Uuid,
        diagnoses: &[Diagnosis],
        generated_at: Timestamp,
    ) -> Self {
        Self {
            kind: ReportKind::BatchSession,
            title: ReportKind::BatchSession.title().to_string(),
            batch_session_id: Some(batch_session_id),
            ..Self::diagnostic(patient, physician, diagnoses, generated_at)
        }
    }

    /// Diagnoses grouped by the minute they were recorded, newest first.
    pub fn history(
        patient: &Patient,
        physician: &User,
        diagnoses: &[Diagnosis],
        generated_at: Timestamp,
    ) -> Self {
        Self {
            kind: ReportKind::History,
            title: ReportKind::History.title().to_string(),
            generated_at,
            patient: PatientSection::from(patient),
            physician: PhysicianSection::from(physician),
            batch_session_id: None,
            summary: None,
            findings: Vec::new(),
            history: history(diagnoses),
            conclusion: None,
            clinical_observations: clinical_observations(diagnoses),
            footer: HISTORY_FOOTER.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        match (self.kind, self.batch_session_id) {
            (ReportKind::BatchSession, Some(id)) => format!("batch_report_{id}.pdf"),
            (ReportKind::History, _) => format!("history_report_{}.pdf", self.patient.id),
            _ => format!("patient_report_{}.pdf", self.patient.id),
        }
    }
}

fn or_na(value: Option<&str>) -> &str {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_AVAILABLE)
}

fn findings(diagnoses: &[Diagnosis]) -> Vec<Finding> {
    diagnoses
        .iter()
        .enumerate()
        .map(|(i, d)| Finding {
            image_id: format!("IMG-{:03}", i + 1),
            diagnosis_id: d.id,
            image_filename: d.image_filename.clone(),
            class_name: d.class_name.clone(),
            confidence: d.confidence,
            confidence_percent: d.confidence_percent,
            created_at: d.created_at,
        })
        .collect()
}

fn summarise(diagnoses: &[Diagnosis]) -> AnalysisSummary {
    let total = diagnoses.len();
    let average = if total == 0 {
        0.0
    } else {
        let sum: f64 = diagnoses.iter().map(|d| d.confidence_percent).sum();
        (sum / total as f64 * 100.0).round() / 100.0
    };
    AnalysisSummary {
        total_images: total,
        average_confidence_percent: average,
    }
}

fn conclusion(diagnoses: &[Diagnosis]) -> Option<Conclusion> {
    let worst = severity::worst(
        diagnoses
            .iter()
            .filter_map(|d| SeverityClass::from_label(&d.class_name).ok()),
    )?;
    Some(Conclusion {
        class_name: worst.label().to_string(),
        text: worst.conclusion().to_string(),
    })
}

/// Trimmed, non-empty notes in first-seen order without repeats.
fn clinical_observations(diagnoses: &[Diagnosis]) -> Vec<String> {
    let mut seen = HashSet::new();
    diagnoses
        .iter()
        .filter_map(|d| d.notes.as_deref().map(str::trim))
        .filter(|n| !n.is_empty() && seen.insert(n.to_string()))
        .map(str::to_string)
        .collect()
}

fn history(diagnoses: &[Diagnosis]) -> Vec<HistoryEntry> {
    let mut groups: BTreeMap<Timestamp, BTreeSet<String>> = BTreeMap::new();
    for d in diagnoses {
        let minute = d
            .created_at
            .duration_trunc(TimeDelta::minutes(1))
            .unwrap_or(d.created_at);
        groups.entry(minute).or_default().insert(d.class_name.clone());
    }
    groups
        .into_iter()
        .rev()
        .map(|(recorded_at, classes)| HistoryEntry {
            recorded_at,
            label: recorded_at.format("%Y-%m-%d %I:%M %p").to_string(),
            findings: classes.into_iter().collect(),
        })
        .collect()
}
