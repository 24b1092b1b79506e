//! Provider wire formats for realtime speech-to-text.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::{TranscriptionError, TranscriptionResult};
use super::token::Credential;

pub const ELEVENLABS_REALTIME_URL: &str = "wss://api.elevenlabs.io/v1/speech-to-text/realtime";
pub const SARVAM_STREAMING_URL: &str = "wss://api.sarvam.ai/speech-to-text/ws";

const PCM_ENCODING: &str = "pcm_s16le";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    ElevenLabs,
    Sarvam,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ElevenLabs => "elevenlabs",
            Self::Sarvam => "sarvam",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "elevenlabs" => Some(Self::ElevenLabs),
            "sarvam" => Some(Self::Sarvam),
            _ => None,
        }
    }

    pub const fn default_websocket_url(self) -> &'static str {
        match self {
            Self::ElevenLabs => ELEVENLABS_REALTIME_URL,
            Self::Sarvam => SARVAM_STREAMING_URL,
        }
    }

    /// Field naming the message kind in every frame.
    const fn discriminator(self) -> &'static str {
        match self {
            Self::ElevenLabs => "message_type",
            Self::Sarvam => "type",
        }
    }

    /// WebSocket URL and handshake headers for a new session.
    pub fn connect_request(
        self,
        base_url: &str,
        credential: &Credential,
        settings: &StreamSettings,
    ) -> ConnectRequest {
        let mut query = Vec::new();
        let mut headers = Vec::new();
        match self {
            Self::ElevenLabs => {
                query.push(("audio_format", format!("pcm_{}", settings.sample_rate)));
                if let Some(language) = &settings.language_code {
                    query.push(("language_code", language.clone()));
                }
                match credential {
                    Credential::Token(token) => query.push(("token", token.clone())),
                    Credential::ApiKey(key) => headers.push(("xi-api-key".to_string(), key.clone())),
                }
            }
            Self::Sarvam => {
                if let Some(language) = &settings.language_code {
                    query.push(("language-code", language.clone()));
                }
                query.push(("sample_rate", settings.sample_rate.to_string()));
                headers.push((
                    "api-subscription-key".to_string(),
                    credential.secret().to_string(),
                ));
            }
        }

        let query = query
            .into_iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if base_url.contains('?') { '&' } else { '?' };
        ConnectRequest {
            url: format!("{base_url}{separator}{query}"),
            headers,
        }
    }

    /// First frame after the socket opens.
    pub fn config_frame(self, credential: &Credential, settings: &StreamSettings) -> Value {
        match self {
            Self::ElevenLabs => json!({
                "message_type": "session_config",
                "sample_rate": settings.sample_rate,
                "audio_format": PCM_ENCODING,
                "language_code": settings.language_code,
            }),
            Self::Sarvam => json!({
                "type": "config",
                "config": {
                    "sample_rate": settings.sample_rate,
                    "language_code": settings.language_code,
                    "api_subscription_key": credential.secret(),
                    "enable_itn": true,
                    "enable_automatic_punctuation": true,
                },
            }),
        }
    }

    pub fn audio_frame(self, audio_base64: &str, sample_rate: u32) -> Value {
        match self {
            Self::ElevenLabs => json!({
                "message_type": "input_audio_chunk",
                "audio_base_64": audio_base64,
                "sample_rate": sample_rate,
                "encoding": PCM_ENCODING,
            }),
            Self::Sarvam => json!({
                "type": "audio",
                "audio": {
                    "data": audio_base64,
                    "sample_rate": sample_rate,
                    "encoding": PCM_ENCODING,
                },
            }),
        }
    }

    pub fn stop_frame(self) -> Value {
        json!({ self.discriminator(): "end_of_stream" })
    }

    /// Decode an inbound text frame.
    pub fn parse_message(self, text: &str) -> TranscriptionResult<ProviderMessage> {
        let value: Value = serde_json::from_str(text).map_err(|error| {
            TranscriptionError::Protocol(format!("invalid JSON frame: {error}"))
        })?;
        let kind = value
            .get(self.discriminator())
            .or_else(|| value.get("type"))
            .or_else(|| value.get("message_type"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TranscriptionError::Protocol(format!(
                    "frame without {} field",
                    self.discriminator()
                ))
            })?;

        let message = match kind {
            "session_started" | "connected" => ProviderMessage::SessionStarted,
            "partial_transcript" => ProviderMessage::Partial(frame_text(&value)),
            "committed_transcript" | "committed_transcript_with_timestamps" => {
                ProviderMessage::Committed(frame_text(&value))
            }
            "error" => ProviderMessage::Error(frame_error(&value, kind)),
            other if other.ends_with("_error") => {
                ProviderMessage::Error(frame_error(&value, kind))
            }
            other => ProviderMessage::Ignored(other.to_string()),
        };
        Ok(message)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio parameters announced to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub sample_rate: u32,
    pub language_code: Option<String>,
}

/// Handshake target for the provider WebSocket.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = self.url.split('?').next().unwrap_or_default();
        formatter
            .debug_struct("ConnectRequest")
            .field("url", &endpoint)
            .field(
                "headers",
                &self
                    .headers
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderMessage {
    SessionStarted,
    Partial(String),
    Committed(String),
    Error(String),
    /// Frames with no effect on the transcript (metadata, keepalives).
    Ignored(String),
}

fn frame_text(value: &Value) -> String {
    let data = value.get("data");
    ["text", "transcript"]
        .iter()
        .find_map(|key| {
            value
                .get(key)
                .or_else(|| data.and_then(|data| data.get(key)))
                .and_then(Value::as_str)
        })
        .unwrap_or_default()
        .to_string()
}

fn frame_error(value: &Value, kind: &str) -> String {
    let data = value.get("data");
    ["error", "message"]
        .iter()
        .find_map(|key| {
            value
                .get(key)
                .or_else(|| data.and_then(|data| data.get(key)))
                .and_then(Value::as_str)
        })
        .map_or_else(|| kind.to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> StreamSettings {
        StreamSettings {
            sample_rate: 16_000,
            language_code: Some("en".to_string()),
        }
    }

    #[test]
    fn provider_names_parse_loosely() {
        assert_eq!(Provider::parse("ElevenLabs"), Some(Provider::ElevenLabs));
        assert_eq!(Provider::parse("eleven_labs"), Some(Provider::ElevenLabs));
        assert_eq!(Provider::parse(" sarvam "), Some(Provider::Sarvam));
        assert_eq!(Provider::parse("whisper"), None);
    }

    #[test]
    fn elevenlabs_uses_message_type_framing() {
        let provider = Provider::ElevenLabs;
        assert_eq!(
            provider.audio_frame("AAA=", 16_000),
            json!({
                "message_type": "input_audio_chunk",
                "audio_base_64": "AAA=",
                "sample_rate": 16_000,
                "encoding": "pcm_s16le"
            })
        );
        assert_eq!(
            provider.stop_frame(),
            json!({"message_type": "end_of_stream"})
        );
        assert_eq!(
            provider
                .parse_message(r#"{"message_type":"partial_transcript","text":"he"}"#)
                .unwrap(),
            ProviderMessage::Partial("he".to_string())
        );
        assert_eq!(
            provider
                .parse_message(r#"{"message_type":"auth_error","error":"token expired"}"#)
                .unwrap(),
            ProviderMessage::Error("token expired".to_string())
        );
    }

    #[test]
    fn sarvam_uses_type_framing_and_key_in_config() {
        let provider = Provider::Sarvam;
        let credential = Credential::ApiKey("sk-live".to_string());
        let config = provider.config_frame(&credential, &settings());
        assert_eq!(config["type"], "config");
        assert_eq!(config["config"]["api_subscription_key"], "sk-live");
        assert_eq!(config["config"]["sample_rate"], 16_000);
        assert_eq!(provider.stop_frame(), json!({"type": "end_of_stream"}));
        assert_eq!(
            provider
                .parse_message(r#"{"type":"committed_transcript","data":{"transcript":"namaste"}}"#)
                .unwrap(),
            ProviderMessage::Committed("namaste".to_string())
        );
        assert_eq!(
            provider.parse_message(r#"{"type":"connected"}"#).unwrap(),
            ProviderMessage::SessionStarted
        );
    }

    #[test]
    fn connect_request_places_credentials_per_provider() {
        let token = Credential::Token("tok en".to_string());
        let request =
            Provider::ElevenLabs.connect_request(ELEVENLABS_REALTIME_URL, &token, &settings());
        assert_eq!(
            request.url,
            format!("{ELEVENLABS_REALTIME_URL}?audio_format=pcm_16000&language_code=en&token=tok%20en")
        );
        assert!(request.headers.is_empty());

        let key = Credential::ApiKey("sk-live".to_string());
        let request = Provider::Sarvam.connect_request(SARVAM_STREAMING_URL, &key, &settings());
        assert_eq!(
            request.headers,
            vec![("api-subscription-key".to_string(), "sk-live".to_string())]
        );
        assert!(!format!("{request:?}").contains("sk-live"));
    }

    #[test]
    fn malformed_frames_are_protocol_errors() {
        assert!(matches!(
            Provider::ElevenLabs.parse_message("not json"),
            Err(TranscriptionError::Protocol(_))
        ));
        assert!(matches!(
            Provider::Sarvam.parse_message(r#"{"text":"orphan"}"#),
            Err(TranscriptionError::Protocol(_))
        ));
        assert_eq!(
            Provider::Sarvam
                .parse_message(r#"{"type":"vad_event"}"#)
                .unwrap(),
            ProviderMessage::Ignored("vad_event".to_string())
        );
    }
}
