//! Patient entity model and DTOs.

use retina_core::types::{DbId, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

/// A row from the `patients` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Patient {
    pub id: DbId,
    pub user_id: DbId,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub medical_id: String,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// DTO for registering a patient under the calling user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePatient {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub medical_id: String,
    pub notes: Option<String>,
}

/// DTO for updating a patient.
///
/// Omitted fields are left alone. The optional columns take an explicit
/// `null` to clear them, which arrives here as `Some(None)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePatient {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub age: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub phone: Option<Option<String>>,
    pub medical_id: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
}

/// Only called for keys that appear in the body, so `null` maps to `Some(None)`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Patient row joined with the class of their most recent diagnosis.
#[derive(Debug, Clone, FromRow)]
pub struct PatientWithLatest {
    #[sqlx(flatten)]
    pub patient: Patient,
    pub latest_class_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_clears_and_absence_keeps() {
        let update: UpdatePatient =
            serde_json::from_str(r#"{"phone": null, "email": "a@b.c"}"#).unwrap();
        assert_eq!(update.phone, Some(None));
        assert_eq!(update.email, Some(Some("a@b.c".to_string())));
        assert_eq!(update.notes, None);
        assert_eq!(update.age, None);
    }
}
