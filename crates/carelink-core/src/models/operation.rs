//! Queued mutation kinds and their translation into remote calls.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::entity::{
    AppointmentCancellation, EntityPatch, EntityRef, NewAppointment, NewConsultation, NewPatient,
};
use crate::{Error, Result};

pub const PATIENTS_TABLE: &str = "patients";
pub const APPOINTMENTS_TABLE: &str = "appointments";
pub const CONSULTATIONS_TABLE: &str = "consultations";

/// A mutation the client can apply while offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperation {
    CreatePatient(NewPatient),
    UpdatePatient(EntityPatch),
    DeletePatient(EntityRef),
    CreateAppointment(NewAppointment),
    UpdateAppointment(EntityPatch),
    CancelAppointment(AppointmentCancellation),
    CreateConsultation(NewConsultation),
}

/// Wire name of each operation, as stored in the queue table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    CreatePatient,
    UpdatePatient,
    DeletePatient,
    CreateAppointment,
    UpdateAppointment,
    CancelAppointment,
    CreateConsultation,
}

impl OperationKind {
    pub const ALL: [Self; 7] = [
        Self::CreatePatient,
        Self::UpdatePatient,
        Self::DeletePatient,
        Self::CreateAppointment,
        Self::UpdateAppointment,
        Self::CancelAppointment,
        Self::CreateConsultation,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatePatient => "CREATE_PATIENT",
            Self::UpdatePatient => "UPDATE_PATIENT",
            Self::DeletePatient => "DELETE_PATIENT",
            Self::CreateAppointment => "CREATE_APPOINTMENT",
            Self::UpdateAppointment => "UPDATE_APPOINTMENT",
            Self::CancelAppointment => "CANCEL_APPOINTMENT",
            Self::CreateConsultation => "CREATE_CONSULTATION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    pub const fn table(self) -> &'static str {
        match self {
            Self::CreatePatient | Self::UpdatePatient | Self::DeletePatient => PATIENTS_TABLE,
            Self::CreateAppointment | Self::UpdateAppointment | Self::CancelAppointment => {
                APPOINTMENTS_TABLE
            }
            Self::CreateConsultation => CONSULTATIONS_TABLE,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remote write derived from a queued operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteMutation {
    Insert { table: &'static str, row: Value },
    Update { table: &'static str, id: String, changes: Value },
    Delete { table: &'static str, id: String },
}

impl SyncOperation {
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::CreatePatient(_) => OperationKind::CreatePatient,
            Self::UpdatePatient(_) => OperationKind::UpdatePatient,
            Self::DeletePatient(_) => OperationKind::DeletePatient,
            Self::CreateAppointment(_) => OperationKind::CreateAppointment,
            Self::UpdateAppointment(_) => OperationKind::UpdateAppointment,
            Self::CancelAppointment(_) => OperationKind::CancelAppointment,
            Self::CreateConsultation(_) => OperationKind::CreateConsultation,
        }
    }

    pub const fn table(&self) -> &'static str {
        self.kind().table()
    }

    pub const fn is_create(&self) -> bool {
        matches!(
            self,
            Self::CreatePatient(_) | Self::CreateAppointment(_) | Self::CreateConsultation(_)
        )
    }

    /// The client-side identifier this operation refers to.
    ///
    /// For creates this is the generated local id; for updates and deletes it
    /// is the target id, which may already be a server id.
    pub fn local_id(&self) -> &str {
        match self {
            Self::CreatePatient(payload) => &payload.local_id,
            Self::CreateAppointment(payload) => &payload.local_id,
            Self::CreateConsultation(payload) => &payload.local_id,
            Self::UpdatePatient(patch) | Self::UpdateAppointment(patch) => &patch.id,
            Self::DeletePatient(target) => &target.id,
            Self::CancelAppointment(cancellation) => &cancellation.id,
        }
    }

    /// Rewrite every entity reference through `resolve`.
    ///
    /// Covers the target id of updates/deletes, the foreign keys of creates,
    /// and any `*_id` string field inside an update's changed fields.
    #[must_use]
    pub fn with_resolved_references(&self, resolve: impl Fn(&str) -> String) -> Self {
        match self {
            Self::CreatePatient(payload) => Self::CreatePatient(payload.clone()),
            Self::CreateAppointment(payload) => Self::CreateAppointment(NewAppointment {
                patient_id: resolve(&payload.patient_id),
                doctor_id: resolve(&payload.doctor_id),
                ..payload.clone()
            }),
            Self::CreateConsultation(payload) => Self::CreateConsultation(NewConsultation {
                appointment_id: resolve(&payload.appointment_id),
                patient_id: resolve(&payload.patient_id),
                doctor_id: resolve(&payload.doctor_id),
                ..payload.clone()
            }),
            Self::UpdatePatient(patch) => Self::UpdatePatient(resolve_patch(patch, &resolve)),
            Self::UpdateAppointment(patch) => {
                Self::UpdateAppointment(resolve_patch(patch, &resolve))
            }
            Self::DeletePatient(target) => Self::DeletePatient(EntityRef {
                id: resolve(&target.id),
            }),
            Self::CancelAppointment(cancellation) => {
                Self::CancelAppointment(AppointmentCancellation {
                    id: resolve(&cancellation.id),
                    reason: cancellation.reason.clone(),
                })
            }
        }
    }

    /// Translate into the remote write that applies this operation.
    ///
    /// Create rows never carry the local id; the server assigns the real one.
    pub fn to_remote_mutation(&self) -> Result<RemoteMutation> {
        let table = self.table();
        let mutation = match self {
            Self::CreatePatient(payload) => RemoteMutation::Insert {
                table,
                row: row_without_local_id(payload)?,
            },
            Self::CreateAppointment(payload) => {
                let mut row = row_without_local_id(payload)?;
                if let Value::Object(fields) = &mut row {
                    fields
                        .entry("status")
                        .or_insert_with(|| Value::String("scheduled".to_string()));
                }
                RemoteMutation::Insert { table, row }
            }
            Self::CreateConsultation(payload) => RemoteMutation::Insert {
                table,
                row: row_without_local_id(payload)?,
            },
            Self::UpdatePatient(patch) | Self::UpdateAppointment(patch) => {
                RemoteMutation::Update {
                    table,
                    id: patch.id.clone(),
                    changes: Value::Object(patch.changes.clone()),
                }
            }
            Self::CancelAppointment(cancellation) => RemoteMutation::Update {
                table,
                id: cancellation.id.clone(),
                changes: json!({
                    "status": "cancelled",
                    "cancellation_reason": cancellation.reason,
                }),
            },
            Self::DeletePatient(target) => RemoteMutation::Delete {
                table,
                id: target.id.clone(),
            },
        };
        Ok(mutation)
    }

    /// Split into the stored `(operation, data)` column pair.
    pub fn encode(&self) -> Result<(OperationKind, Value)> {
        let mut tagged = serde_json::to_value(self)?;
        let data = tagged
            .get_mut("data")
            .map(Value::take)
            .ok_or_else(|| Error::InvalidInput("operation payload missing".to_string()))?;
        Ok((self.kind(), data))
    }
}

fn resolve_patch(patch: &EntityPatch, resolve: &impl Fn(&str) -> String) -> EntityPatch {
    let changes = patch
        .changes
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(reference) if key.ends_with("_id") => {
                    Value::String(resolve(reference))
                }
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect::<Map<_, _>>();

    EntityPatch {
        id: resolve(&patch.id),
        changes,
    }
}

fn row_without_local_id(payload: &impl Serialize) -> Result<Value> {
    let mut row = serde_json::to_value(payload)?;
    if let Value::Object(fields) = &mut row {
        fields.remove("local_id");
    }
    Ok(row)
}

/// Operation as read back from the local store.
///
/// Rows written by a newer client may name operations this build does not
/// know; those load as `Unsupported` instead of failing the whole queue read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueuedOperation {
    Known(SyncOperation),
    Unsupported {
        operation: String,
        data: Value,
    },
    Malformed {
        operation: OperationKind,
        data: Value,
        error: String,
    },
}

impl QueuedOperation {
    /// Rebuild an operation from its stored `(operation, data)` columns.
    pub fn decode(operation: &str, data: Value) -> Self {
        let Some(kind) = OperationKind::parse(operation) else {
            return Self::Unsupported {
                operation: operation.to_string(),
                data,
            };
        };

        let tagged = json!({ "operation": kind.as_str(), "data": data });
        match serde_json::from_value::<SyncOperation>(tagged) {
            Ok(known) => Self::Known(known),
            Err(error) => Self::Malformed {
                operation: kind,
                data,
                error: error.to_string(),
            },
        }
    }

    /// Stored operation name.
    pub fn name(&self) -> &str {
        match self {
            Self::Known(operation) => operation.kind().as_str(),
            Self::Unsupported { operation, .. } => operation,
            Self::Malformed { operation, .. } => operation.as_str(),
        }
    }

    /// Stored payload.
    pub fn data(&self) -> Result<Value> {
        match self {
            Self::Known(operation) => Ok(operation.encode()?.1),
            Self::Unsupported { data, .. } | Self::Malformed { data, .. } => Ok(data.clone()),
        }
    }
}

impl From<SyncOperation> for QueuedOperation {
    fn from(value: SyncOperation) -> Self {
        Self::Known(value)
    }
}
