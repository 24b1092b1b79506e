//! Data models for CareLink

mod cached;
mod entity;
mod operation;
mod queue_item;

pub use cached::CachedEntity;
pub use entity::{
    is_local_id, AppointmentCancellation, EntityPatch, EntityRef, NewAppointment,
    NewConsultation, NewPatient, Patient, LOCAL_ID_PREFIX,
};
pub use operation::{
    OperationKind, QueuedOperation, RemoteMutation, SyncOperation, APPOINTMENTS_TABLE,
    CONSULTATIONS_TABLE, PATIENTS_TABLE,
};
pub use queue_item::{SyncQueueItem, QUEUE_ID_PREFIX};
