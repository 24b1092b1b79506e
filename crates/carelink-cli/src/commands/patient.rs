use carelink_core::models::{EntityPatch, EntityRef, NewPatient, Patient, SyncOperation};
use carelink_core::util::normalize_text_option;
use carelink_core::LocalStore;

use crate::cli::PatientCommands;
use crate::commands::common::{
    parse_assignments, parse_date, print_json, require_text, truncate, CliEnv,
};
use crate::error::CliError;

pub async fn run_patient(command: PatientCommands, env: &CliEnv) -> Result<(), CliError> {
    match command {
        PatientCommands::Add {
            name,
            email,
            phone,
            dob,
            gender,
        } => {
            let new_patient = NewPatient {
                local_id: LocalStore::generate_local_id(),
                full_name: require_text(&name, "Patient name")?,
                email: normalize_text_option(email),
                phone: normalize_text_option(phone),
                date_of_birth: dob.as_deref().map(parse_date).transpose()?,
                gender: normalize_text_option(gender),
            };
            let local_id = new_patient.local_id.clone();
            env.enqueue(SyncOperation::CreatePatient(new_patient)).await?;
            println!("{local_id}");
        }
        PatientCommands::Update { id, fields } => {
            let patch = EntityPatch {
                id: require_text(&id, "Patient ID")?,
                changes: parse_assignments(&fields)?,
            };
            let target = patch.id.clone();
            env.enqueue(SyncOperation::UpdatePatient(patch)).await?;
            println!("{target}");
        }
        PatientCommands::Delete { id } => {
            let target = EntityRef {
                id: require_text(&id, "Patient ID")?,
            };
            let id = target.id.clone();
            env.enqueue(SyncOperation::DeletePatient(target)).await?;
            println!("{id}");
        }
        PatientCommands::Show { id, json } => {
            let id = require_text(&id, "Patient ID")?;
            let patient = find_patient(&id, env).await?;
            if json {
                print_json(&patient)?;
            } else {
                for line in format_patient_details(&patient) {
                    println!("{line}");
                }
            }
        }
        PatientCommands::List { json } => {
            let store = env.open_store().await?;
            let patients = store.list_cached_patients().await?;
            if json {
                print_json(&patients)?;
            } else if patients.is_empty() {
                println!("No cached patients.");
            } else {
                for line in format_patient_lines(&patients) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

/// Look up a cached patient by either id, following a synced local id to its
/// server id.
async fn find_patient(id: &str, env: &CliEnv) -> Result<Patient, CliError> {
    let config = env.load_config()?;
    let context = env.open_context(&config).await?;
    let resolved = context.id_mapper().resolve(id);
    context
        .store()
        .get_cached_patient(&resolved)
        .await?
        .ok_or_else(|| CliError::NotCached {
            table: "patient",
            id: id.to_string(),
        })
}

pub fn format_patient_lines(patients: &[Patient]) -> Vec<String> {
    patients
        .iter()
        .map(|patient| {
            let contact = patient
                .phone
                .as_deref()
                .or(patient.email.as_deref())
                .unwrap_or("");
            format!(
                "{:<42}  {:<32}  {}",
                patient.id,
                truncate(&patient.full_name, 32),
                contact
            )
        })
        .collect()
}

fn format_patient_details(patient: &Patient) -> Vec<String> {
    let mut lines = vec![
        format!("id:            {}", patient.id),
        format!("name:          {}", patient.full_name),
    ];
    if let Some(email) = &patient.email {
        lines.push(format!("email:         {email}"));
    }
    if let Some(phone) = &patient.phone {
        lines.push(format!("phone:         {phone}"));
    }
    if let Some(date_of_birth) = patient.date_of_birth {
        lines.push(format!("date of birth: {date_of_birth}"));
    }
    if let Some(gender) = &patient.gender {
        lines.push(format!("gender:        {gender}"));
    }
    for (field, value) in &patient.extra {
        lines.push(format!("{field}: {value}"));
    }
    lines
}
