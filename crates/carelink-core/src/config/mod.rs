//! Client configuration.
//!
//! `AppConfig` is read from a JSON file and then overlaid with `CARELINK_*`
//! environment variables. The access token is only ever taken from the
//! environment and is never written back to disk.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sync::{SupabaseRestClient, SyncSettings, DEFAULT_MAX_RETRIES};
use crate::transcription::{Provider, SessionOptions};
use crate::util::{is_http_url, is_ws_url, normalize_text_option};
use crate::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

pub const ENV_SUPABASE_URL: &str = "CARELINK_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "CARELINK_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "CARELINK_ACCESS_TOKEN";
pub const ENV_SYNC_MAX_RETRIES: &str = "CARELINK_SYNC_MAX_RETRIES";
pub const ENV_SYNC_RETRY_DELAY_MS: &str = "CARELINK_SYNC_RETRY_DELAY_MS";
pub const ENV_SYNC_INTERVAL_SECS: &str = "CARELINK_SYNC_INTERVAL_SECS";
pub const ENV_STT_PROVIDER: &str = "CARELINK_STT_PROVIDER";
pub const ENV_STT_TOKEN_ENDPOINT: &str = "CARELINK_STT_TOKEN_ENDPOINT";
pub const ENV_STT_WEBSOCKET_URL: &str = "CARELINK_STT_WEBSOCKET_URL";
pub const ENV_STT_LANGUAGE: &str = "CARELINK_STT_LANGUAGE";

/// Public endpoints and tuning knobs. Secrets other than the anon key
/// must never be stored here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(skip)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Seconds between scheduled passes; 0 disables the timer
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TranscriptionConfig {
    pub provider: Provider,
    pub token_endpoint: Option<String>,
    pub websocket_url: Option<String>,
    pub language_code: Option<String>,
    pub sample_rate: u32,
    pub buffer_size: usize,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            token_endpoint: None,
            websocket_url: None,
            language_code: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|error| {
            Error::InvalidInput(format!("config at {}: {error}", path.display()))
        })
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        let mut config = serde_json::from_str::<Self>(payload)?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut normalized = self.clone();
        normalized.normalize();
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values returned by `lookup`; unset or blank variables are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| normalize_text_option(lookup(key));

        if let Some(value) = get(ENV_SUPABASE_URL) {
            self.supabase_url = Some(value);
        }
        if let Some(value) = get(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = Some(value);
        }
        if let Some(value) = get(ENV_ACCESS_TOKEN) {
            self.access_token = Some(value);
        }
        if let Some(value) = get(ENV_SYNC_MAX_RETRIES) {
            self.sync.max_retries = parse_number(ENV_SYNC_MAX_RETRIES, &value)?;
        }
        if let Some(value) = get(ENV_SYNC_RETRY_DELAY_MS) {
            self.sync.retry_delay_ms = parse_number(ENV_SYNC_RETRY_DELAY_MS, &value)?;
        }
        if let Some(value) = get(ENV_SYNC_INTERVAL_SECS) {
            self.sync.interval_secs = parse_number(ENV_SYNC_INTERVAL_SECS, &value)?;
        }
        if let Some(value) = get(ENV_STT_PROVIDER) {
            self.transcription.provider = Provider::parse(&value).ok_or_else(|| {
                Error::InvalidInput(format!("{ENV_STT_PROVIDER}: unknown provider '{value}'"))
            })?;
        }
        if let Some(value) = get(ENV_STT_TOKEN_ENDPOINT) {
            self.transcription.token_endpoint = Some(value);
        }
        if let Some(value) = get(ENV_STT_WEBSOCKET_URL) {
            self.transcription.websocket_url = Some(value);
        }
        if let Some(value) = get(ENV_STT_LANGUAGE) {
            self.transcription.language_code = Some(value);
        }

        self.normalize();
        Ok(())
    }

    /// Reject values no client could use.
    pub fn validate(&self) -> Result<()> {
        if !(1..=DEFAULT_MAX_RETRIES).contains(&self.sync.max_retries) {
            return Err(Error::InvalidInput(format!(
                "sync.max_retries must be between 1 and {DEFAULT_MAX_RETRIES}"
            )));
        }
        if let Some(url) = &self.supabase_url {
            if !is_http_url(url) {
                return Err(Error::InvalidInput(
                    "supabase_url must include http:// or https://".to_string(),
                ));
            }
        }
        if let Some(endpoint) = &self.transcription.token_endpoint {
            if !is_http_url(endpoint) {
                return Err(Error::InvalidInput(
                    "transcription.token_endpoint must include http:// or https://".to_string(),
                ));
            }
        }
        if let Some(url) = &self.transcription.websocket_url {
            if !is_ws_url(url) {
                return Err(Error::InvalidInput(
                    "transcription.websocket_url must include ws:// or wss://".to_string(),
                ));
            }
        }
        if self.transcription.sample_rate == 0 {
            return Err(Error::InvalidInput(
                "transcription.sample_rate must be greater than zero".to_string(),
            ));
        }
        if self.transcription.buffer_size == 0 {
            return Err(Error::InvalidInput(
                "transcription.buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            max_retries: self.sync.max_retries,
            retry_delay: Duration::from_millis(self.sync.retry_delay_ms),
        }
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    /// Whether both Supabase values needed for a sync pass are present.
    pub const fn has_remote(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }

    /// Build the PostgREST client, or `None` when Supabase is not configured.
    pub fn remote_client(&self) -> Result<Option<SupabaseRestClient>> {
        let (Some(url), Some(anon_key)) = (&self.supabase_url, &self.supabase_anon_key) else {
            return Ok(None);
        };
        let client = SupabaseRestClient::new(url.clone(), anon_key.clone())
            .map_err(|error| Error::InvalidInput(error.to_string()))?
            .with_access_token(self.access_token.clone());
        Ok(Some(client))
    }

    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::new(self.transcription.provider);
        options.websocket_url.clone_from(&self.transcription.websocket_url);
        options.language_code.clone_from(&self.transcription.language_code);
        options
    }

    fn normalize(&mut self) {
        self.supabase_url = normalize_url(self.supabase_url.take());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.take());
        self.access_token = normalize_text_option(self.access_token.take());
        self.transcription.token_endpoint = normalize_url(self.transcription.token_endpoint.take());
        self.transcription.websocket_url = normalize_url(self.transcription.websocket_url.take());
        self.transcription.language_code =
            normalize_text_option(self.transcription.language_code.take());
    }
}

fn normalize_url(value: Option<String>) -> Option<String> {
    normalize_text_option(value).map(|url| url.trim_end_matches('/').to_string())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{key}: expected a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_portal_behavior() {
        let config = AppConfig::default();
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync_settings().retry_delay, Duration::from_millis(1000));
        assert_eq!(config.transcription.sample_rate, 16_000);
        assert_eq!(config.transcription.buffer_size, 4096);
        assert_eq!(config.transcription.provider, Provider::ElevenLabs);
        assert!(!config.has_remote());
    }

    #[test]
    fn partial_json_keeps_defaults_and_normalizes() {
        let config = AppConfig::from_json(
            r#"{
                "supabase_url": " https://demo.supabase.co/ ",
                "supabase_anon_key": "   ",
                "sync": { "retry_delay_ms": 250 },
                "transcription": { "provider": "sarvam", "language_code": "hi-IN" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.supabase_url.as_deref(), Some("https://demo.supabase.co"));
        assert_eq!(config.supabase_anon_key, None);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.retry_delay_ms, 250);
        assert_eq!(config.transcription.provider, Provider::Sarvam);
        assert_eq!(config.transcription.sample_rate, 16_000);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(AppConfig::from_json(r#"{"supabase_service_key": "nope"}"#).is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::from_json(r#"{"supabase_url": "https://file.example"}"#).unwrap();
        config
            .apply_env(env(&[
                (ENV_SUPABASE_URL, "https://env.example/"),
                (ENV_SUPABASE_ANON_KEY, "anon"),
                (ENV_ACCESS_TOKEN, "user-jwt"),
                (ENV_SYNC_MAX_RETRIES, "2"),
                (ENV_STT_PROVIDER, "Sarvam"),
                (ENV_STT_LANGUAGE, " "),
            ]))
            .unwrap();

        assert_eq!(config.supabase_url.as_deref(), Some("https://env.example"));
        assert_eq!(config.access_token.as_deref(), Some("user-jwt"));
        assert_eq!(config.sync.max_retries, 2);
        assert_eq!(config.transcription.provider, Provider::Sarvam);
        assert_eq!(config.transcription.language_code, None);
        assert!(config.has_remote());
        assert!(config.remote_client().unwrap().is_some());
    }

    #[test]
    fn env_rejects_malformed_values() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_env(env(&[(ENV_SYNC_RETRY_DELAY_MS, "soon")]))
            .is_err());
        assert!(config
            .apply_env(env(&[(ENV_STT_PROVIDER, "whisper")]))
            .is_err());
    }

    #[test]
    fn validate_checks_url_schemes() {
        let mut config = AppConfig {
            supabase_url: Some("demo.supabase.co".to_string()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        config.supabase_url = Some("https://demo.supabase.co".to_string());
        config.transcription.websocket_url = Some("https://api.example/ws".to_string());
        assert!(config.validate().is_err());

        config.transcription.websocket_url = Some("wss://api.example/ws".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_bounds_retry_ceiling() {
        let mut config = AppConfig::default();
        config.sync.max_retries = 0;
        assert!(config.validate().is_err());
        config.sync.max_retries = 4;
        assert!(config.validate().is_err());

        config
            .apply_env(env(&[(ENV_SYNC_MAX_RETRIES, "0")]))
            .unwrap();
        assert!(config.validate().is_err());

        config.sync.max_retries = 1;
        assert!(config.validate().is_ok());
        config.sync.max_retries = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn saved_file_never_contains_access_token() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILE_NAME);
        let config = AppConfig {
            supabase_url: Some("https://demo.supabase.co".to_string()),
            access_token: Some("user-jwt".to_string()),
            ..AppConfig::default()
        };

        config.save_to_path(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("user-jwt"));

        let loaded = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.supabase_url, config.supabase_url);
        assert_eq!(loaded.access_token, None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempdir().unwrap();
        let loaded = AppConfig::load_from_path(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn session_options_follow_transcription_config() {
        let mut config = AppConfig::default();
        config.transcription.provider = Provider::Sarvam;
        config.transcription.language_code = Some("ta-IN".to_string());
        let options = config.session_options();
        assert_eq!(options.provider, Provider::Sarvam);
        assert_eq!(options.language_code.as_deref(), Some("ta-IN"));
        assert_eq!(options.websocket_url, None);
    }
}
