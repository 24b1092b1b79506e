//! Live speech-to-text over provider WebSockets.
//!
//! A session fetches short-lived credentials, opens the provider socket,
//! streams base64 PCM16 audio frames, and reconciles interim and committed
//! transcript segments.

mod error;
mod pcm;
mod protocol;
mod session;
mod source;
mod token;
mod transcript;
mod transport;

pub use error::{TranscriptionError, TranscriptionResult};
pub use pcm::{encode_pcm16_base64, encode_pcm16_le, encode_wav, f32_to_i16, i16_to_f32};
pub use protocol::{
    ConnectRequest, Provider, ProviderMessage, StreamSettings, ELEVENLABS_REALTIME_URL,
    SARVAM_STREAMING_URL,
};
pub use session::{
    CredentialSource, SessionOptions, SessionState, TranscriptUpdate, TranscriptionHandle,
    TranscriptionSession,
};
pub use source::{AudioSource, ChannelSource, WavFileSource};
pub use token::{Credential, TokenClient};
pub use transcript::Transcript;
pub use transport::{TranscriptionConnector, TranscriptionSocket, WebSocketConnector};
