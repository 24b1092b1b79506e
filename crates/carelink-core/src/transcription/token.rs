//! Short-lived provider credentials.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use super::error::{TranscriptionError, TranscriptionResult};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const TOKEN_HTTP_TIMEOUT_SECS: u64 = 10;

/// Credential handed out by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Single-use session token
    Token(String),
    /// Provider API key
    ApiKey(String),
}

impl Credential {
    pub fn secret(&self) -> &str {
        match self {
            Self::Token(value) | Self::ApiKey(value) => value,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Token(_) => "Token",
            Self::ApiKey(_) => "ApiKey",
        };
        formatter.debug_tuple(kind).field(&"[REDACTED]").finish()
    }
}

/// Fetches credentials once per session start.
#[derive(Clone)]
pub struct TokenClient {
    endpoint: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl TokenClient {
    pub fn new(endpoint: impl Into<String>) -> TranscriptionResult<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        Ok(Self {
            endpoint,
            access_token: None,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(TOKEN_HTTP_TIMEOUT_SECS))
                .build()?,
        })
    }

    /// Authenticate token requests as the signed-in user.
    #[must_use]
    pub fn with_access_token(mut self, access_token: Option<String>) -> Self {
        self.access_token = normalize_text_option(access_token);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn fetch(&self) -> TranscriptionResult<Credential> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(access_token) = &self.access_token {
            request = request.bearer_auth(access_token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Token(parse_api_error(status, &body)));
        }

        let payload = response.json::<TokenResponse>().await?;
        payload.try_into()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    api_key: Option<String>,
}

impl TryFrom<TokenResponse> for Credential {
    type Error = TranscriptionError;

    fn try_from(value: TokenResponse) -> TranscriptionResult<Self> {
        if let Some(token) = normalize_text_option(value.token) {
            return Ok(Self::Token(token));
        }
        normalize_text_option(value.api_key)
            .map(Self::ApiKey)
            .ok_or_else(|| {
                TranscriptionError::Token("response did not include token/api_key".to_string())
            })
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<TokenErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> TranscriptionResult<String> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        TranscriptionError::InvalidConfiguration("token endpoint must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(TranscriptionError::InvalidConfiguration(
            "token endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com/token".to_string()).is_err());
        assert_eq!(
            normalize_endpoint(" https://api.example.com/token/ ".to_string()).unwrap(),
            "https://api.example.com/token"
        );
    }

    #[test]
    fn credential_debug_redacts_secret() {
        let debug = format!("{:?}", Credential::ApiKey("secret".to_string()));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_accepts_token_or_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/elevenlabs-token"))
            .and(header("authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "single-use"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sarvam-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"api_key": "sk-1"})))
            .mount(&server)
            .await;

        let eleven = TokenClient::new(format!("{}/elevenlabs-token", server.uri()))
            .unwrap()
            .with_access_token(Some("user-jwt".to_string()));
        assert_eq!(
            eleven.fetch().await.unwrap(),
            Credential::Token("single-use".to_string())
        );

        let sarvam = TokenClient::new(format!("{}/sarvam-token", server.uri())).unwrap();
        assert_eq!(
            sarvam.fetch().await.unwrap(),
            Credential::ApiKey("sk-1".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_reports_endpoint_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "not signed in"})),
            )
            .mount(&server)
            .await;

        let client = TokenClient::new(server.uri()).unwrap();
        match client.fetch().await.unwrap_err() {
            TranscriptionError::Token(message) => assert_eq!(message, "not signed in (401)"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_rejects_empty_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "  "})))
            .mount(&server)
            .await;

        let client = TokenClient::new(server.uri()).unwrap();
        assert!(matches!(
            client.fetch().await,
            Err(TranscriptionError::Token(_))
        ));
    }
}
