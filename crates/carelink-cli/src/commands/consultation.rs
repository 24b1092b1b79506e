use carelink_core::models::{NewConsultation, SyncOperation};
use carelink_core::util::normalize_text_option;
use carelink_core::LocalStore;

use crate::cli::ConsultationCommands;
use crate::commands::common::{require_text, CliEnv};
use crate::error::CliError;

pub async fn run_consultation(
    command: ConsultationCommands,
    env: &CliEnv,
) -> Result<(), CliError> {
    match command {
        ConsultationCommands::Add {
            appointment,
            patient,
            doctor,
            notes,
            diagnosis,
            prescription,
        } => {
            let consultation = NewConsultation {
                local_id: LocalStore::generate_local_id(),
                appointment_id: require_text(&appointment, "Appointment ID")?,
                patient_id: require_text(&patient, "Patient ID")?,
                doctor_id: require_text(&doctor, "Doctor ID")?,
                notes: normalize_text_option(notes),
                diagnosis: normalize_text_option(diagnosis),
                prescription: normalize_text_option(prescription),
            };
            let local_id = consultation.local_id.clone();
            env.enqueue(SyncOperation::CreateConsultation(consultation))
                .await?;
            println!("{local_id}");
        }
    }
    Ok(())
}
