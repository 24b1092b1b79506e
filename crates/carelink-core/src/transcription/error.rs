use thiserror::Error;

/// Errors from transcription setup, transport, and providers.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Invalid transcription configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token endpoint error: {0}")]
    Token(String),
    #[error("Transcription connection error: {0}")]
    Transport(String),
    #[error("Transcription provider error: {0}")]
    Provider(String),
    #[error("Audio error: {0}")]
    Audio(String),
    #[error("Unexpected provider message: {0}")]
    Protocol(String),
    #[error("Session already started")]
    AlreadyStarted,
}

impl From<tokio_tungstenite::tungstenite::Error> for TranscriptionError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<hound::Error> for TranscriptionError {
    fn from(error: hound::Error) -> Self {
        Self::Audio(error.to_string())
    }
}

pub type TranscriptionResult<T> = Result<T, TranscriptionError>;
