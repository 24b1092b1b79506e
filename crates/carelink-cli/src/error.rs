use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] carelink_core::Error),
    #[error(transparent)]
    Remote(#[from] carelink_core::sync::RemoteError),
    #[error(transparent)]
    Transcription(#[from] carelink_core::transcription::TranscriptionError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),
    #[error("Invalid field assignment '{0}' (expected FIELD=VALUE)")]
    InvalidAssignment(String),
    #[error("Invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },
    #[error("No cached {table} entry with id {id}")]
    NotCached { table: &'static str, id: String },
    #[error("Queue entry not found: {0}")]
    QueueItemNotFound(String),
    #[error(
        "Sync is not configured. Run `carelink config init --supabase-url <URL> --supabase-anon-key <KEY>` or set CARELINK_SUPABASE_URL and CARELINK_SUPABASE_ANON_KEY."
    )]
    SyncNotConfigured,
    #[error(
        "Transcription is not configured. Run `carelink config init --token-endpoint <URL>` or set CARELINK_STT_TOKEN_ENDPOINT."
    )]
    TranscriptionNotConfigured,
    #[error("Transcription ended with an error: {0}")]
    TranscriptionFailed(String),
}
