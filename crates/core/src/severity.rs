//! Diabetic-retinopathy severity classes and patient risk buckets.
//!
//! The classifier emits five scores in a fixed order; [`SeverityClass`]
//! gives each index its clinical label, its report conclusion and the
//! dashboard bucket it falls into.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// SeverityClass
// ---------------------------------------------------------------------------

/// Number of classes the model must emit.
pub const CLASS_COUNT: usize = 5;

/// Severity grade, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeverityClass {
    #[serde(rename = "No DR")]
    NoDr,
    Mild,
    Moderate,
    Severe,
    Proliferative,
}

impl SeverityClass {
    /// All classes in model output order.
    pub const ALL: [SeverityClass; CLASS_COUNT] = [
        SeverityClass::NoDr,
        SeverityClass::Mild,
        SeverityClass::Moderate,
        SeverityClass::Severe,
        SeverityClass::Proliferative,
    ];

    /// Map a model output index to its class.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Position of this class in the model output vector.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            SeverityClass::NoDr => "No DR",
            SeverityClass::Mild => "Mild",
            SeverityClass::Moderate => "Moderate",
            SeverityClass::Severe => "Severe",
            SeverityClass::Proliferative => "Proliferative",
        }
    }

    /// Parse a stored class label (exact match).
    pub fn from_label(label: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|c| c.label() == label)
            .ok_or_else(|| CoreError::Validation(format!("Unknown severity class '{label}'")))
    }

    /// Recommendation printed as the final conclusion of a report.
    pub fn conclusion(self) -> &'static str {
        match self {
            SeverityClass::NoDr => {
                "No signs of diabetic retinopathy. Routine annual screening is advised."
            }
            SeverityClass::Mild => {
                "Mild diabetic retinopathy detected. Regular monitoring and good diabetic \
                 control are recommended."
            }
            SeverityClass::Moderate => {
                "Moderate DR detected. Further ophthalmic evaluation is advised."
            }
            SeverityClass::Severe => {
                "Severe DR detected. Immediate ophthalmologist consultation is recommended."
            }
            SeverityClass::Proliferative => {
                "Proliferative DR detected. Urgent specialist treatment is required."
            }
        }
    }

    /// Chart bucket: 0 for No DR, 1 for Mild/Moderate, 2 for Severe/Proliferative.
    pub fn distribution_bucket(self) -> usize {
        match self {
            SeverityClass::NoDr => 0,
            SeverityClass::Mild | SeverityClass::Moderate => 1,
            SeverityClass::Severe | SeverityClass::Proliferative => 2,
        }
    }
}

/// Most severe class among `classes`, if any.
pub fn worst<I>(classes: I) -> Option<SeverityClass>
where
    I: IntoIterator<Item = SeverityClass>,
{
    classes.into_iter().max()
}

// ---------------------------------------------------------------------------
// PatientStatus
// ---------------------------------------------------------------------------

/// Patient list filter applied to the most recent diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Healthy,
    AtRisk,
    Critical,
    /// No diagnosis recorded yet.
    New,
}

impl PatientStatus {
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "healthy" => Ok(Self::Healthy),
            "at_risk" => Ok(Self::AtRisk),
            "critical" => Ok(Self::Critical),
            "new" => Ok(Self::New),
            other => Err(CoreError::Validation(format!(
                "Invalid status '{other}'. Must be one of: healthy, at_risk, critical, new"
            ))),
        }
    }

    /// Narrowest status for a patient whose latest diagnosis is `latest`.
    pub fn of(latest: Option<SeverityClass>) -> Self {
        match latest {
            None => PatientStatus::New,
            Some(SeverityClass::NoDr) => PatientStatus::Healthy,
            Some(c) if c >= SeverityClass::Severe => PatientStatus::Critical,
            Some(_) => PatientStatus::AtRisk,
        }
    }

    /// Whether a patient whose latest diagnosis is `latest` belongs in this filter.
    ///
    /// `AtRisk` covers every DR finding, `Critical` only the two most severe grades.
    pub fn matches(self, latest: Option<SeverityClass>) -> bool {
        match (self, latest) {
            (PatientStatus::New, None) => true,
            (PatientStatus::Healthy, Some(c)) => c == SeverityClass::NoDr,
            (PatientStatus::AtRisk, Some(c)) => c != SeverityClass::NoDr,
            (PatientStatus::Critical, Some(c)) => c >= SeverityClass::Severe,
            _ => false,
        }
    }
}
