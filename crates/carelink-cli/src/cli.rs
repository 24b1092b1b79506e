use std::path::PathBuf;

use carelink_core::transcription::Provider;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "carelink")]
#[command(about = "Queue portal changes offline, sync them, and transcribe consultations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Acting user recorded on queued changes
    #[arg(long, global = true, value_name = "ID", env = "CARELINK_USER_ID")]
    pub user_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, change, or inspect patients
    Patient {
        #[command(subcommand)]
        command: PatientCommands,
    },
    /// Book, reschedule, or cancel appointments
    Appointment {
        #[command(subcommand)]
        command: AppointmentCommands,
    },
    /// Record consultations
    Consultation {
        #[command(subcommand)]
        command: ConsultationCommands,
    },
    /// Inspect or repair the pending sync queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Push pending changes to Supabase
    Sync {
        /// Keep running passes on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
        /// Print sync events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Stream a WAV file through a live transcription session
    Transcribe {
        /// WAV file to transcribe
        file: PathBuf,
        /// Provider override
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
        /// Language code override (e.g. en, hi-IN)
        #[arg(long, value_name = "CODE")]
        language: Option<String>,
        /// Send audio at playback speed instead of as fast as possible
        #[arg(long)]
        realtime: bool,
        /// Print the final transcript as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or update the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
    Elvish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProviderArg {
    Elevenlabs,
    Sarvam,
}

impl ProviderArg {
    pub const fn provider(self) -> Provider {
        match self {
            Self::Elevenlabs => Provider::ElevenLabs,
            Self::Sarvam => Provider::Sarvam,
        }
    }
}

#[derive(Subcommand)]
pub enum PatientCommands {
    /// Register a new patient
    Add {
        /// Full name
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        dob: Option<String>,
        #[arg(long)]
        gender: Option<String>,
    },
    /// Change fields of a patient
    Update {
        /// Patient id (local or server)
        id: String,
        /// Field assignment, repeatable (e.g. --set phone=+911234)
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        fields: Vec<String>,
    },
    /// Delete a patient
    Delete {
        /// Patient id (local or server)
        id: String,
    },
    /// Show a cached patient
    Show {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cached patients
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AppointmentCommands {
    /// Book an appointment
    Book {
        /// Patient id (local or server)
        #[arg(long)]
        patient: String,
        /// Doctor id
        #[arg(long)]
        doctor: String,
        /// Start time (RFC 3339, e.g. 2026-03-01T09:30:00Z)
        #[arg(long, value_name = "TIME")]
        at: String,
        /// Length in minutes
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        reason: Option<String>,
        /// Consultation type (e.g. video, in_person)
        #[arg(long = "type", value_name = "TYPE")]
        consultation_type: Option<String>,
    },
    /// Change fields of an appointment
    Update {
        /// Appointment id (local or server)
        id: String,
        /// Field assignment, repeatable (e.g. --set status=confirmed)
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        fields: Vec<String>,
    },
    /// Cancel an appointment
    Cancel {
        /// Appointment id (local or server)
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConsultationCommands {
    /// Record a consultation for an appointment
    Add {
        /// Appointment id (local or server)
        #[arg(long)]
        appointment: String,
        /// Patient id (local or server)
        #[arg(long)]
        patient: String,
        /// Doctor id
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        diagnosis: Option<String>,
        #[arg(long)]
        prescription: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List pending changes, oldest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the number of pending changes
    Count,
    /// Reset the retry counter so the next pass attempts the change again
    Retry {
        /// Queue entry id
        #[arg(required_unless_present = "all")]
        id: Option<String>,
        /// Reset every change that reached the retry limit
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Remove a change from the queue without sending it
    Drop {
        /// Queue entry id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (file plus environment)
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the config file location
    Path,
    /// Write values to the config file
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Transcription token endpoint
        #[arg(long, value_name = "URL")]
        token_endpoint: Option<String>,
        /// Transcription provider
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
        /// Transcription language code
        #[arg(long, value_name = "CODE")]
        language: Option<String>,
        /// Seconds between passes in `sync --watch`
        #[arg(long, value_name = "SECS")]
        sync_interval: Option<u64>,
    },
}
