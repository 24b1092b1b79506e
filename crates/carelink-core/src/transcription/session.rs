//! Live transcription session lifecycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::error::{TranscriptionError, TranscriptionResult};
use super::pcm::encode_pcm16_base64;
use super::protocol::{Provider, ProviderMessage, StreamSettings};
use super::source::AudioSource;
use super::token::{Credential, TokenClient};
use super::transcript::Transcript;
use super::transport::{TranscriptionConnector, TranscriptionSocket};

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Stopped,
    Error,
}

impl SessionState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }
}

/// Snapshot published on every state or transcript change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptUpdate {
    pub state: SessionState,
    pub transcript: Transcript,
    pub error: Option<String>,
}

/// Where session credentials come from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credential(&self) -> TranscriptionResult<Credential>;
}

#[async_trait]
impl CredentialSource for TokenClient {
    async fn credential(&self) -> TranscriptionResult<Credential> {
        self.fetch().await
    }
}

#[async_trait]
impl CredentialSource for Credential {
    async fn credential(&self) -> TranscriptionResult<Credential> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub provider: Provider,
    /// Overrides the provider's default WebSocket URL
    pub websocket_url: Option<String>,
    pub language_code: Option<String>,
    /// Longest wait for the provider's session-started acknowledgement
    pub ack_timeout: Duration,
    /// Longest wait for final transcripts after the audio ends
    pub drain_timeout: Duration,
}

impl SessionOptions {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            websocket_url: None,
            language_code: None,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Starts transcription sessions against one provider.
pub struct TranscriptionSession {
    options: SessionOptions,
    credentials: Arc<dyn CredentialSource>,
    connector: Arc<dyn TranscriptionConnector>,
}

impl TranscriptionSession {
    pub fn new(
        options: SessionOptions,
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn TranscriptionConnector>,
    ) -> Self {
        Self {
            options,
            credentials,
            connector,
        }
    }

    /// Fetch credentials, connect, configure the stream, and begin pumping
    /// audio from `source` once the provider acknowledges the session.
    ///
    /// On failure the source is stopped before the error is returned.
    pub async fn start(
        &self,
        source: Box<dyn AudioSource>,
    ) -> TranscriptionResult<TranscriptionHandle> {
        let (updates, receiver) = watch::channel(TranscriptUpdate {
            state: SessionState::Idle,
            transcript: Transcript::new(),
            error: None,
        });
        let mut resources = Resources {
            socket: None,
            source: Some(source),
        };
        let provider = self.options.provider;

        publish_state(&updates, SessionState::Connecting, None);
        let settings = StreamSettings {
            sample_rate: resources
                .source
                .as_ref()
                .map_or(16_000, |source| source.sample_rate()),
            language_code: self.options.language_code.clone(),
        };

        let connected = async {
            let credential = self.credentials.credential().await?;
            let base_url = self
                .options
                .websocket_url
                .as_deref()
                .unwrap_or_else(|| provider.default_websocket_url());
            let request = provider.connect_request(base_url, &credential, &settings);
            let mut socket = self.connector.connect(&request).await?;
            socket
                .send_json(&provider.config_frame(&credential, &settings))
                .await?;
            Ok::<_, TranscriptionError>(socket)
        }
        .await;

        let socket = match connected {
            Ok(socket) => socket,
            Err(error) => {
                tracing::warn!("Could not start {} session: {}", provider, error);
                resources.teardown(provider, false).await;
                publish_state(&updates, SessionState::Error, Some(error.to_string()));
                return Err(error);
            }
        };
        resources.socket = Some(socket);
        tracing::info!("{} session connecting at {} Hz", provider, settings.sample_rate);

        let stop = Arc::new(Notify::new());
        let driver = SessionDriver {
            provider,
            sample_rate: settings.sample_rate,
            ack_timeout: self.options.ack_timeout,
            drain_timeout: self.options.drain_timeout,
            resources,
            updates,
            stop: Arc::clone(&stop),
            stop_sent: false,
        };
        let task = tokio::spawn(driver.run());

        Ok(TranscriptionHandle {
            updates: receiver,
            stop,
            task: Some(task),
        })
    }
}

/// Control and observation of a running session.
///
/// Dropping the handle requests a stop.
#[derive(Debug)]
pub struct TranscriptionHandle {
    updates: watch::Receiver<TranscriptUpdate>,
    stop: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl TranscriptionHandle {
    pub fn state(&self) -> SessionState {
        self.updates.borrow().state
    }

    pub fn transcript(&self) -> Transcript {
        self.updates.borrow().transcript.clone()
    }

    pub fn update(&self) -> TranscriptUpdate {
        self.updates.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<TranscriptUpdate> {
        self.updates.clone()
    }

    /// Ask the session to stop without waiting.
    pub fn request_stop(&self) {
        self.stop.notify_one();
    }

    /// Stop the session and wait for teardown to finish.
    pub async fn stop(&mut self) -> TranscriptUpdate {
        self.request_stop();
        self.finished().await
    }

    /// Wait until the session stops on its own or fails.
    pub async fn finished(&mut self) -> TranscriptUpdate {
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::error!("Transcription task ended abnormally: {}", error);
            }
        }
        self.update()
    }
}

impl Drop for TranscriptionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.request_stop();
        }
    }
}

/// Session-owned resources, each released at most once.
struct Resources {
    socket: Option<Box<dyn TranscriptionSocket>>,
    source: Option<Box<dyn AudioSource>>,
}

impl Resources {
    async fn teardown(&mut self, provider: Provider, send_stop: bool) {
        if let Some(mut socket) = self.socket.take() {
            if send_stop {
                if let Err(error) = socket.send_json(&provider.stop_frame()).await {
                    tracing::debug!("Stop frame not delivered: {}", error);
                }
            }
            if let Err(error) = socket.close().await {
                tracing::debug!("Socket close failed: {}", error);
            }
        }
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }
}

enum Step {
    Continue,
    Finish(SessionState, Option<String>),
}

struct SessionDriver {
    provider: Provider,
    sample_rate: u32,
    ack_timeout: Duration,
    drain_timeout: Duration,
    resources: Resources,
    updates: watch::Sender<TranscriptUpdate>,
    stop: Arc<Notify>,
    stop_sent: bool,
}

impl SessionDriver {
    async fn run(mut self) {
        let (state, error) = self.drive().await;
        // A stop frame only makes sense while the provider still expects audio.
        let send_stop = state == SessionState::Stopped && !self.stop_sent;
        self.resources.teardown(self.provider, send_stop).await;

        match &error {
            Some(message) => tracing::warn!("{} session failed: {}", self.provider, message),
            None => tracing::info!("{} session stopped", self.provider),
        }
        publish_state(&self.updates, state, error);
    }

    async fn drive(&mut self) -> (SessionState, Option<String>) {
        let ack_deadline = tokio::time::sleep(self.ack_timeout);
        tokio::pin!(ack_deadline);
        let drain_deadline = tokio::time::sleep(self.drain_timeout);
        tokio::pin!(drain_deadline);
        let mut streaming = false;

        loop {
            let (Some(socket), Some(source)) = (
                self.resources.socket.as_mut(),
                self.resources.source.as_mut(),
            ) else {
                return (SessionState::Stopped, None);
            };
            let draining = self.stop_sent;

            let step = tokio::select! {
                () = self.stop.notified() => Step::Finish(SessionState::Stopped, None),
                () = &mut ack_deadline, if !streaming => Step::Finish(
                    SessionState::Error,
                    Some("provider did not acknowledge the session".to_string()),
                ),
                () = &mut drain_deadline, if draining => {
                    tracing::debug!("Timed out waiting for final transcripts");
                    Step::Finish(SessionState::Stopped, None)
                }
                inbound = socket.next_text() => match inbound {
                    Ok(Some(text)) => self.handle_message(&text, &mut streaming),
                    Ok(None) if draining => Step::Finish(SessionState::Stopped, None),
                    Ok(None) => Step::Finish(
                        SessionState::Error,
                        Some("connection closed by provider".to_string()),
                    ),
                    Err(error) => Step::Finish(SessionState::Error, Some(error.to_string())),
                },
                buffer = source.next_buffer(), if streaming && !draining => match buffer {
                    Ok(Some(samples)) => {
                        let frame = self
                            .provider
                            .audio_frame(&encode_pcm16_base64(&samples), self.sample_rate);
                        match socket.send_json(&frame).await {
                            Ok(()) => Step::Continue,
                            Err(error) => Step::Finish(SessionState::Error, Some(error.to_string())),
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Audio source finished; waiting for final transcripts");
                        match socket.send_json(&self.provider.stop_frame()).await {
                            Ok(()) => {
                                self.stop_sent = true;
                                drain_deadline
                                    .as_mut()
                                    .reset(tokio::time::Instant::now() + self.drain_timeout);
                                Step::Continue
                            }
                            Err(error) => Step::Finish(SessionState::Error, Some(error.to_string())),
                        }
                    }
                    Err(error) => Step::Finish(SessionState::Error, Some(error.to_string())),
                },
            };

            if let Step::Finish(state, error) = step {
                return (state, error);
            }
        }
    }

    fn handle_message(&self, text: &str, streaming: &mut bool) -> Step {
        let message = match self.provider.parse_message(text) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!("Ignoring provider frame: {}", error);
                return Step::Continue;
            }
        };

        match message {
            ProviderMessage::SessionStarted => {
                if !*streaming {
                    *streaming = true;
                    tracing::info!("{} session streaming", self.provider);
                    publish_state(&self.updates, SessionState::Streaming, None);
                }
            }
            ProviderMessage::Partial(text) => {
                self.updates
                    .send_modify(|update| update.transcript.apply_partial(&text));
            }
            ProviderMessage::Committed(text) => {
                self.updates
                    .send_modify(|update| update.transcript.apply_committed(&text));
            }
            ProviderMessage::Error(message) => {
                return Step::Finish(SessionState::Error, Some(message));
            }
            ProviderMessage::Ignored(kind) => tracing::trace!("Ignoring {} frame", kind),
        }
        Step::Continue
    }
}

fn publish_state(
    updates: &watch::Sender<TranscriptUpdate>,
    state: SessionState,
    error: Option<String>,
) {
    updates.send_modify(|update| {
        update.state = state;
        if error.is_some() {
            update.error = error;
        }
    });
}
