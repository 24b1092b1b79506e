use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use carelink_core::config::CONFIG_FILE_NAME;
use carelink_core::models::{RemoteMutation, SyncOperation};
use carelink_core::sync::{RemoteDatabase, RemoteError, RemoteResult, SyncContext};
use carelink_core::util::normalize_text_option;
use carelink_core::{AppConfig, LocalStore, SyncQueueItem};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CliError;

/// Paths and identity shared by every command.
#[derive(Debug, Clone)]
pub struct CliEnv {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub user_id: Option<String>,
}

impl CliEnv {
    pub fn resolve(
        db_path: Option<PathBuf>,
        config_path: Option<PathBuf>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            db_path: resolve_db_path(db_path),
            config_path: resolve_config_path(config_path),
            user_id: normalize_text_option(user_id),
        }
    }

    /// Config file overlaid with `CARELINK_*` environment variables.
    pub fn load_config(&self) -> Result<AppConfig, CliError> {
        let mut config = AppConfig::load_from_path(&self.config_path)?;
        config.apply_process_env()?;
        config.validate()?;
        Ok(config)
    }

    pub async fn open_store(&self) -> Result<LocalStore, CliError> {
        Ok(LocalStore::open_path(self.db_path.clone()).await?)
    }

    /// Context for offline writes; works without a configured remote.
    pub async fn open_context(&self, config: &AppConfig) -> Result<SyncContext, CliError> {
        let remote: Arc<dyn RemoteDatabase> = match config.remote_client()? {
            Some(client) => Arc::new(client),
            None => Arc::new(UnconfiguredRemote),
        };
        self.context_with_remote(config, remote).await
    }

    /// Context for sync passes; fails when Supabase is not configured.
    pub async fn open_sync_context(&self, config: &AppConfig) -> Result<SyncContext, CliError> {
        let client = config.remote_client()?.ok_or(CliError::SyncNotConfigured)?;
        self.context_with_remote(config, Arc::new(client)).await
    }

    async fn context_with_remote(
        &self,
        config: &AppConfig,
        remote: Arc<dyn RemoteDatabase>,
    ) -> Result<SyncContext, CliError> {
        let store = self.open_store().await?;
        let context = SyncContext::new(store, remote, config.sync_settings());
        context.hydrate_id_mappings().await?;
        Ok(context)
    }

    /// Queue `operation` on behalf of the acting user.
    pub async fn enqueue(&self, operation: SyncOperation) -> Result<SyncQueueItem, CliError> {
        let config = self.load_config()?;
        let context = self.open_context(&config).await?;
        let item = context.enqueue(operation, self.user_id.clone()).await?;
        tracing::info!(
            "Queued {} ({} pending)",
            item.operation.name(),
            context.store().get_sync_queue_count().await?
        );
        Ok(item)
    }
}

/// Stand-in remote for offline-only commands, which never contact it.
struct UnconfiguredRemote;

impl UnconfiguredRemote {
    fn error() -> RemoteError {
        RemoteError::InvalidConfiguration("Supabase is not configured".to_string())
    }
}

#[async_trait]
impl RemoteDatabase for UnconfiguredRemote {
    async fn insert(&self, _table: &str, _row: &Value) -> RemoteResult<Value> {
        Err(Self::error())
    }

    async fn update(&self, _table: &str, _id: &str, _changes: &Value) -> RemoteResult<Value> {
        Err(Self::error())
    }

    async fn delete(&self, _table: &str, _id: &str) -> RemoteResult<()> {
        Err(Self::error())
    }

    async fn select_by_id(&self, _table: &str, _id: &str) -> RemoteResult<Option<Value>> {
        Err(Self::error())
    }

    async fn apply(&self, _mutation: &RemoteMutation) -> RemoteResult<Option<Value>> {
        Err(Self::error())
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("CARELINK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("carelink")
        .join("carelink.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os("CARELINK_CONFIG").map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(env::temp_dir)
        .join("carelink")
        .join(CONFIG_FILE_NAME)
}

pub fn require_text(value: &str, field: &'static str) -> Result<String, CliError> {
    normalize_text_option(Some(value.to_string())).ok_or(CliError::EmptyValue(field))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|error| {
        CliError::InvalidArgument {
            field: "date",
            message: format!("'{value}' ({error}); expected YYYY-MM-DD"),
        }
    })
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|date_time| date_time.with_timezone(&Utc))
        .map_err(|error| CliError::InvalidArgument {
            field: "time",
            message: format!("'{value}' ({error}); expected RFC 3339"),
        })
}

/// Parse repeated `FIELD=VALUE` arguments into a change set.
///
/// Values that parse as JSON (numbers, booleans, `null`, quoted strings)
/// keep their type; anything else is taken as a plain string.
pub fn parse_assignments(assignments: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut changes = Map::new();
    for assignment in assignments {
        let Some((field, raw_value)) = assignment.split_once('=') else {
            return Err(CliError::InvalidAssignment(assignment.clone()));
        };
        let field = field.trim();
        if field.is_empty() || field == "id" {
            return Err(CliError::InvalidAssignment(assignment.clone()));
        }

        let raw_value = raw_value.trim();
        let value = serde_json::from_str::<Value>(raw_value)
            .ok()
            .filter(|value| !value.is_object() && !value.is_array())
            .unwrap_or_else(|| Value::String(raw_value.to_string()));
        changes.insert(field.to_string(), value);
    }
    Ok(changes)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
