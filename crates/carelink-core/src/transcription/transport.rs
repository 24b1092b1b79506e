//! WebSocket transport to the speech-to-text provider.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::error::{TranscriptionError, TranscriptionResult};
use super::protocol::ConnectRequest;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens provider connections.
#[async_trait]
pub trait TranscriptionConnector: Send + Sync {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> TranscriptionResult<Box<dyn TranscriptionSocket>>;
}

/// An open, JSON-framed provider connection.
#[async_trait]
pub trait TranscriptionSocket: Send {
    async fn send_json(&mut self, frame: &Value) -> TranscriptionResult<()>;

    /// Next inbound text frame; `None` once the peer has closed.
    async fn next_text(&mut self) -> TranscriptionResult<Option<String>>;

    async fn close(&mut self) -> TranscriptionResult<()>;
}

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WebSocketConnector {
    pub const fn with_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl TranscriptionConnector for WebSocketConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> TranscriptionResult<Box<dyn TranscriptionSocket>> {
        let mut ws_request = request.url.as_str().into_client_request()?;
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|error| {
                TranscriptionError::InvalidConfiguration(format!("invalid header name: {error}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|error| {
                TranscriptionError::InvalidConfiguration(format!("invalid header value: {error}"))
            })?;
            ws_request.headers_mut().insert(name, value);
        }

        tracing::debug!("Connecting to {:?}", request);
        let (stream, _response) = timeout(self.connect_timeout, connect_async(ws_request))
            .await
            .map_err(|_| {
                TranscriptionError::Transport(format!(
                    "connection timed out after {:?}",
                    self.connect_timeout
                ))
            })??;

        Ok(Box::new(WebSocketTransport { stream }))
    }
}

struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TranscriptionSocket for WebSocketTransport {
    async fn send_json(&mut self, frame: &Value) -> TranscriptionResult<()> {
        self.stream.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> TranscriptionResult<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => tracing::debug!("Ignoring non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    tracing::debug!("Provider closed the connection: {:?}", frame);
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> TranscriptionResult<()> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}
