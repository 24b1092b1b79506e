use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use carelink_core::transcription::{
    AudioSource, SessionState, TokenClient, TranscriptUpdate, TranscriptionSession,
    WavFileSource, WebSocketConnector,
};
use carelink_core::util::normalize_text_option;

use crate::cli::ProviderArg;
use crate::commands::common::{print_json, CliEnv};
use crate::error::CliError;

pub async fn run_transcribe(
    file: &Path,
    provider: Option<ProviderArg>,
    language: Option<String>,
    realtime: bool,
    as_json: bool,
    env: &CliEnv,
) -> Result<(), CliError> {
    let mut config = env.load_config()?;
    if let Some(provider) = provider {
        config.transcription.provider = provider.provider();
    }
    if let Some(language) = normalize_text_option(language) {
        config.transcription.language_code = Some(language);
    }

    let endpoint = config
        .transcription
        .token_endpoint
        .clone()
        .ok_or(CliError::TranscriptionNotConfigured)?;
    let credentials = TokenClient::new(endpoint)?.with_access_token(config.access_token.clone());

    let mut source = WavFileSource::open(file, config.transcription.buffer_size)?;
    if source.sample_rate() != config.transcription.sample_rate {
        tracing::warn!(
            "{} is {} Hz; streaming at the file rate instead of {} Hz",
            file.display(),
            source.sample_rate(),
            config.transcription.sample_rate
        );
    }
    tracing::info!(
        "Transcribing {:?} of audio with {}",
        source.duration(),
        config.transcription.provider
    );
    if realtime {
        source = source.with_realtime_pacing();
    }

    let session = TranscriptionSession::new(
        config.session_options(),
        Arc::new(credentials),
        Arc::new(WebSocketConnector::default()),
    );
    let mut handle = session.start(Box::new(source)).await?;
    let mut updates = handle.subscribe();
    let live = !as_json && io::stderr().is_terminal();

    let final_update = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break handle.finished().await;
                }
                let update = updates.borrow_and_update().clone();
                if live {
                    render_live(&update);
                }
                if update.state.is_terminal() {
                    break handle.finished().await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping transcription");
                break handle.stop().await;
            }
        }
    };
    if live {
        eprintln!();
    }

    if as_json {
        print_json(&final_update)?;
    } else {
        println!("{}", final_update.transcript.display_text());
    }

    if final_update.state == SessionState::Error {
        return Err(CliError::TranscriptionFailed(
            final_update
                .error
                .unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(())
}

fn render_live(update: &TranscriptUpdate) {
    let mut stderr = io::stderr().lock();
    let _ = write!(
        stderr,
        "\r\x1b[2K[{:?}] {}",
        update.state,
        update.transcript.display_text()
    );
    let _ = stderr.flush();
}
