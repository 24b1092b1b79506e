use carelink_core::models::{AppointmentCancellation, EntityPatch, NewAppointment, SyncOperation};
use carelink_core::util::normalize_text_option;
use carelink_core::LocalStore;

use crate::cli::AppointmentCommands;
use crate::commands::common::{parse_assignments, parse_timestamp, require_text, CliEnv};
use crate::error::CliError;

pub async fn run_appointment(command: AppointmentCommands, env: &CliEnv) -> Result<(), CliError> {
    match command {
        AppointmentCommands::Book {
            patient,
            doctor,
            at,
            duration,
            reason,
            consultation_type,
        } => {
            if duration == Some(0) {
                return Err(CliError::InvalidArgument {
                    field: "duration",
                    message: "must be at least one minute".to_string(),
                });
            }
            let appointment = NewAppointment {
                local_id: LocalStore::generate_local_id(),
                patient_id: require_text(&patient, "Patient ID")?,
                doctor_id: require_text(&doctor, "Doctor ID")?,
                scheduled_at: parse_timestamp(&at)?,
                duration_minutes: duration,
                reason: normalize_text_option(reason),
                consultation_type: normalize_text_option(consultation_type),
            };
            let local_id = appointment.local_id.clone();
            env.enqueue(SyncOperation::CreateAppointment(appointment))
                .await?;
            println!("{local_id}");
        }
        AppointmentCommands::Update { id, fields } => {
            let patch = EntityPatch {
                id: require_text(&id, "Appointment ID")?,
                changes: parse_assignments(&fields)?,
            };
            let target = patch.id.clone();
            env.enqueue(SyncOperation::UpdateAppointment(patch)).await?;
            println!("{target}");
        }
        AppointmentCommands::Cancel { id, reason } => {
            let cancellation = AppointmentCancellation {
                id: require_text(&id, "Appointment ID")?,
                reason: normalize_text_option(reason),
            };
            let target = cancellation.id.clone();
            env.enqueue(SyncOperation::CancelAppointment(cancellation))
                .await?;
            println!("{target}");
        }
    }
    Ok(())
}
