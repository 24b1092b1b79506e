//! Remote database access over Supabase PostgREST.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::RemoteMutation;
use crate::util::{compact_text, is_http_url, normalize_text_option};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// How the sync engine should treat a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify an HTTP status into retry behavior.
pub const fn classify_http_status(status: u16) -> RetryClass {
    match status {
        401 | 403 => RetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 | 500..=599 => RetryClass::Retryable,
        _ => RetryClass::Permanent,
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote request failed: {0}")]
    Transport(String),
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("No {table} row with id {id}")]
    NotFound { table: String, id: String },
    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub const fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transport(_) => RetryClass::Retryable,
            Self::Api { status, .. } => classify_http_status(*status),
            Self::InvalidConfiguration(_) | Self::NotFound { .. } | Self::InvalidResponse(_) => {
                RetryClass::Permanent
            }
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Api {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            Self::Transport(error.to_string())
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Row-level access to the remote tables.
#[async_trait]
pub trait RemoteDatabase: Send + Sync {
    /// Insert `row` and return the stored row, including its server id.
    async fn insert(&self, table: &str, row: &Value) -> RemoteResult<Value>;

    /// Apply `changes` to the row with `id` and return the stored row.
    async fn update(&self, table: &str, id: &str, changes: &Value) -> RemoteResult<Value>;

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()>;

    async fn select_by_id(&self, table: &str, id: &str) -> RemoteResult<Option<Value>>;

    /// Apply a queued mutation; returns the stored row when the server sends one.
    async fn apply(&self, mutation: &RemoteMutation) -> RemoteResult<Option<Value>> {
        match mutation {
            RemoteMutation::Insert { table, row } => self.insert(table, row).await.map(Some),
            RemoteMutation::Update { table, id, changes } => {
                self.update(table, id, changes).await.map(Some)
            }
            RemoteMutation::Delete { table, id } => self.delete(table, id).await.map(|()| None),
        }
    }
}

/// PostgREST client authenticated with the project anon key and, when
/// signed in, the user's access token.
#[derive(Clone)]
pub struct SupabaseRestClient {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for SupabaseRestClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseRestClient")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl SupabaseRestClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> RemoteResult<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .filter(|url| is_http_url(url))
            .ok_or_else(|| {
                RemoteError::InvalidConfiguration(
                    "Supabase URL must include http:// or https://".to_string(),
                )
            })?
            .trim_end_matches('/')
            .to_string();
        let anon_key = normalize_text_option(Some(anon_key.into())).ok_or_else(|| {
            RemoteError::InvalidConfiguration("Supabase anon key must not be empty".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url,
            anon_key,
            access_token: None,
            client,
        })
    }

    #[must_use]
    pub fn with_access_token(mut self, access_token: Option<String>) -> Self {
        self.access_token = normalize_text_option(access_token);
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn headers(&self) -> RemoteResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&self.anon_key)?);
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        headers.insert(
            reqwest::header::AUTHORIZATION,
            header_value(&format!("Bearer {bearer}"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        table: &str,
        id: Option<&str>,
        body: Option<&Value>,
    ) -> RemoteResult<Vec<Value>> {
        let mut request = self
            .client
            .request(method.clone(), self.table_url(table))
            .headers(self.headers()?);
        if let Some(id) = id {
            request = request.query(&[("id", format!("eq.{id}"))]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!("{} {} (id {:?})", method, table, id);
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status, &body);
            tracing::warn!("{} {} failed: {}", method, table, message);
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text)
            .map_err(|error| RemoteError::InvalidResponse(error.to_string()))?
        {
            Value::Array(rows) => Ok(rows),
            row @ Value::Object(_) => Ok(vec![row]),
            other => Err(RemoteError::InvalidResponse(format!(
                "expected rows, got {}",
                compact_text(&other.to_string())
            ))),
        }
    }
}

#[async_trait]
impl RemoteDatabase for SupabaseRestClient {
    async fn insert(&self, table: &str, row: &Value) -> RemoteResult<Value> {
        self.send(Method::POST, table, None, Some(row))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RemoteError::InvalidResponse(format!("insert into {table} returned no row"))
            })
    }

    async fn update(&self, table: &str, id: &str, changes: &Value) -> RemoteResult<Value> {
        self.send(Method::PATCH, table, Some(id), Some(changes))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        self.send(Method::DELETE, table, Some(id), None).await?;
        Ok(())
    }

    async fn select_by_id(&self, table: &str, id: &str) -> RemoteResult<Option<Value>> {
        Ok(self
            .send(Method::GET, table, Some(id), None)
            .await?
            .into_iter()
            .next())
    }
}

fn header_value(value: &str) -> RemoteResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|error| {
        RemoteError::InvalidConfiguration(format!("invalid header value: {error}"))
    })
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match normalize_text_option(payload.details) {
                Some(details) => format!("{}: {}", message.trim(), details),
                None => message.trim().to_string(),
            };
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SupabaseRestClient {
        SupabaseRestClient::new(server.uri(), "anon-key")
            .unwrap()
            .with_access_token(Some("user-jwt".to_string()))
    }

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(500), RetryClass::Retryable);
        assert_eq!(classify_http_status(503), RetryClass::Retryable);
        assert_eq!(classify_http_status(429), RetryClass::Retryable);
        assert_eq!(classify_http_status(409), RetryClass::Retryable);
        assert_eq!(classify_http_status(401), RetryClass::ReauthRequired);
        assert_eq!(classify_http_status(400), RetryClass::Permanent);
        assert_eq!(classify_http_status(422), RetryClass::Permanent);
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert_eq!(
            RemoteError::Transport("connection reset".to_string()).retry_class(),
            RetryClass::Retryable
        );
        assert_eq!(
            RemoteError::InvalidResponse("garbage".to_string()).retry_class(),
            RetryClass::Permanent
        );
    }

    #[test]
    fn new_rejects_invalid_configuration() {
        assert!(SupabaseRestClient::new("project.supabase.co", "anon").is_err());
        assert!(SupabaseRestClient::new("https://project.supabase.co", "  ").is_err());
    }

    #[test]
    fn debug_redacts_credentials() {
        let client = SupabaseRestClient::new("https://project.supabase.co/", "anon-secret")
            .unwrap()
            .with_access_token(Some("jwt-secret".to_string()));
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("https://project.supabase.co\""));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_returns_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/patients"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer user-jwt"))
            .and(header("prefer", "return=representation"))
            .and(body_json(json!({"full_name": "Asha Rao"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([{"id": "srv-1", "full_name": "Asha Rao"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let row = client(&server)
            .insert("patients", &json!({"full_name": "Asha Rao"}))
            .await
            .unwrap();
        assert_eq!(row, json!({"id": "srv-1", "full_name": "Asha Rao"}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_filters_by_id_and_reports_missing_rows() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", "eq.srv-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": "srv-2", "status": "cancelled"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", "eq.srv-404"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client(&server);
        let row = client
            .update("appointments", "srv-2", &json!({"status": "cancelled"}))
            .await
            .unwrap();
        assert_eq!(row["status"], "cancelled");

        let error = client
            .update("appointments", "srv-404", &json!({"status": "cancelled"}))
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::NotFound { .. }));
        assert_eq!(error.retry_class(), RetryClass::Permanent);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn api_errors_carry_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/consultations"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "23502",
                "message": "null value in column \"doctor_id\"",
                "details": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/patients"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client(&server);
        let error = client
            .insert("consultations", &json!({}))
            .await
            .unwrap_err();
        match &error {
            RemoteError::Api { status, message } => {
                assert_eq!(*status, 400);
                assert_eq!(message, "null value in column \"doctor_id\"");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(error.retry_class(), RetryClass::Permanent);

        let error = client.delete("patients", "srv-1").await.unwrap_err();
        assert_eq!(error.retry_class(), RetryClass::Retryable);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn select_by_id_and_delete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .and(query_param("id", "eq.srv-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "srv-3"}])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/patients"))
            .and(query_param("id", "eq.srv-3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(
            client.select_by_id("patients", "srv-3").await.unwrap(),
            Some(json!({"id": "srv-3"}))
        );
        client
            .apply(&RemoteMutation::Delete {
                table: "patients",
                id: "srv-3".to_string(),
            })
            .await
            .unwrap();
    }
}
