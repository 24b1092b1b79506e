//! CareLink CLI - offline portal changes from the command line
//!
//! Queues patient, appointment, and consultation changes locally, pushes them
//! to Supabase when asked, and streams recordings through live transcription.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::appointment::run_appointment;
use crate::commands::common::CliEnv;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::consultation::run_consultation;
use crate::commands::patient::run_patient;
use crate::commands::queue::run_queue;
use crate::commands::sync::run_sync;
use crate::commands::transcribe::run_transcribe;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("carelink=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let env = CliEnv::resolve(cli.db_path, cli.config, cli.user_id);

    match cli.command {
        Commands::Patient { command } => run_patient(command, &env).await?,
        Commands::Appointment { command } => run_appointment(command, &env).await?,
        Commands::Consultation { command } => run_consultation(command, &env).await?,
        Commands::Queue { command } => run_queue(command, &env).await?,
        Commands::Sync { watch, json } => run_sync(watch, json, &env).await?,
        Commands::Transcribe {
            file,
            provider,
            language,
            realtime,
            json,
        } => run_transcribe(&file, provider, language, realtime, json, &env).await?,
        Commands::Config { command } => run_config(command, &env)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
