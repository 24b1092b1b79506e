//! Portal entities and the payloads carried by queued mutations.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix carried by every client-generated entity id.
///
/// Server ids are bare UUIDs, so a prefixed id can never collide with one.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Returns whether `id` was generated on this client.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Cached patient snapshot.
///
/// Fields the portal does not model explicitly are kept in `extra` so a
/// server row survives a cache round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Patient {
    /// Optimistic local snapshot for a patient that has not synced yet.
    #[must_use]
    pub fn from_new(new_patient: &NewPatient) -> Self {
        Self {
            id: new_patient.local_id.clone(),
            full_name: new_patient.full_name.clone(),
            email: new_patient.email.clone(),
            phone: new_patient.phone.clone(),
            date_of_birth: new_patient.date_of_birth,
            gender: new_patient.gender.clone(),
            extra: Map::new(),
        }
    }
}

/// Payload of `CREATE_PATIENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub local_id: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// Payload of `CREATE_APPOINTMENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub local_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consultation_type: Option<String>,
}

/// Payload of `CANCEL_APPOINTMENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentCancellation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `CREATE_CONSULTATION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConsultation {
    pub local_id: String,
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription: Option<String>,
}

/// Changed fields of an existing entity (`UPDATE_*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPatch {
    pub id: String,
    pub changes: Map<String, Value>,
}

/// Reference to an existing entity (`DELETE_*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_ids_are_recognized_by_prefix() {
        assert!(is_local_id("local-0190a1b2"));
        assert!(!is_local_id("6f1c2a9e-3d4b-4f5a-9c1d-2e3f4a5b6c7d"));
    }

    #[test]
    fn patient_keeps_unknown_server_fields() {
        let row = json!({
            "id": "srv-1",
            "full_name": "Asha Rao",
            "blood_group": "O+",
            "created_at": "2026-01-02T03:04:05Z"
        });
        let patient: Patient = serde_json::from_value(row.clone()).unwrap();
        assert_eq!(patient.full_name, "Asha Rao");
        assert_eq!(patient.extra.get("blood_group"), Some(&json!("O+")));
        assert_eq!(serde_json::to_value(&patient).unwrap(), row);
    }

    #[test]
    fn optimistic_snapshot_uses_local_id() {
        let new_patient = NewPatient {
            local_id: "local-1".to_string(),
            full_name: "Ravi Kumar".to_string(),
            email: None,
            phone: Some("+91 98765 43210".to_string()),
            date_of_birth: None,
            gender: None,
        };
        let patient = Patient::from_new(&new_patient);
        assert_eq!(patient.id, "local-1");
        assert_eq!(patient.phone.as_deref(), Some("+91 98765 43210"));
    }
}
